use tg_oauth_webapp::{
    config::WebappConfig,
    init_webapp, server,
    utils::from_env::FromEnv,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let _guard = init_webapp();

    let cfg = WebappConfig::from_env()?;
    server::serve(&cfg).await?;

    Ok(())
}
