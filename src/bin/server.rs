use netlens::{logging, protocols, server, ServerConfig};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    logging::init(0);
    let config = ServerConfig::from_env();

    protocols::install_from(config.protocol_map.as_deref())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    server::run(config).await
}
