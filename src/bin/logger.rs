use {
    anyhow::Result,
    barometer::config::{LoggerConfig, Parsed},
};

#[tokio::main]
async fn main() -> Result<()> {
    barometer::init_logging();

    match LoggerConfig::from_env_args()? {
        Parsed::Run(config) => barometer::logger(config).await,
        Parsed::Help => {
            print!("{}", LoggerConfig::usage());
            Ok(())
        }
    }
}
