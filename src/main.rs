use dotenvy::dotenv;

use vakit::error::ApplicationError;

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = vakit::config::load()?;

    let _guard = vakit::logger::init(&config)?;

    vakit::api::serve(config).await
}
