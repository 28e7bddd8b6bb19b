use {
    anyhow::Result,
    barometer::config::{ExporterConfig, Parsed},
};

#[tokio::main]
async fn main() -> Result<()> {
    barometer::init_logging();

    match ExporterConfig::from_env_args()? {
        Parsed::Run(config) => barometer::exporter(config).await,
        Parsed::Help => {
            print!("{}", ExporterConfig::usage());
            Ok(())
        }
    }
}
