use clap::Parser;
use color_eyre::eyre::Report;
use mychat::Settings;
use mychat::layers::ErrorLayer;

#[tokio::main]
async fn main() -> Result<(), Report> {
    ErrorLayer.setup()?;

    let settings = Settings::parse();
    mychat::run(settings).await
}
