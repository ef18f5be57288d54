// src/settings.rs

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use chrono::FixedOffset;
use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_DB_DIR: &str = "data/housing";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: PathBuf,

    /// Path to the certificate file. Serves HTTPS together with `--key`.
    #[arg(long, value_name = "CERT_PATH", requires = "key")]
    pub cert: Option<PathBuf>,

    /// Path to the key file.
    #[arg(long, value_name = "KEY_PATH", requires = "cert")]
    pub key: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub address: SocketAddr,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ModelSettings {
    pub encoder_path: PathBuf,
    pub poly_path: PathBuf,
    pub model_path: PathBuf,
}

/// Zipcodes accepted by the prediction endpoints.
#[derive(Debug, Deserialize)]
pub struct ValidationSettings {
    pub zipcode_min: u32,
    pub zipcode_max: u32,
}

/// Range and seed for the synthetic market trend table.
#[derive(Debug, Deserialize)]
pub struct MarketSettings {
    pub zip_start: u32,
    pub zip_end: u32,
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct DisplaySettings {
    /// Offset applied to stored UTC timestamps when shown or exported.
    #[serde(deserialize_with = "deserialize_fixed_offset")]
    pub utc_offset: FixedOffset,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub database: DatabaseSettings,
    pub model: ModelSettings,
    pub validation: ValidationSettings,
    pub market: MarketSettings,
    pub display: DisplaySettings,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("database.path", default_db_path())?
            .set_default("model.encoder_path", "model/saved_model/encoder.json")?
            .set_default("model.poly_path", "model/saved_model/poly.json")?
            .set_default("model.model_path", "model/saved_model/model.json")?
            .set_default("validation.zipcode_min", 98001_i64)?
            .set_default("validation.zipcode_max", 99001_i64)?
            .set_default("market.zip_start", 98001_i64)?
            .set_default("market.zip_end", 99001_i64)?
            .set_default("display.utc_offset", "+03:00")?;

        let cfg = builder.add_source(File::from(path)).build()?;

        cfg.try_deserialize()
    }
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", env!("CARGO_PKG_NAME")).map_or_else(
        || DEFAULT_DB_DIR.to_string(),
        |dirs| dirs.data_dir().join("housing").display().to_string(),
    )
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn deserialize_fixed_offset<'de, D>(deserializer: D) -> Result<FixedOffset, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let file = write_config("[database]\npath = \"/tmp/housing\"\n");
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.web.address, DEFAULT_ADDR.parse().unwrap());
        assert_eq!(settings.database.path, PathBuf::from("/tmp/housing"));
        assert_eq!(settings.validation.zipcode_min, 98001);
        assert_eq!(settings.validation.zipcode_max, 99001);
        assert_eq!(settings.market.seed, None);
        assert_eq!(settings.display.utc_offset.local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn overrides_are_applied() {
        let file = write_config(
            r#"
            [web]
            address = "0.0.0.0:9000"

            [market]
            zip_start = 98100
            zip_end = 98110
            seed = 7

            [display]
            utc_offset = "-05:00"
            "#,
        );
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.web.address.port(), 9000);
        assert_eq!(settings.market.zip_start, 98100);
        assert_eq!(settings.market.seed, Some(7));
        assert_eq!(settings.display.utc_offset.local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn invalid_address_is_an_error() {
        let file = write_config("[web]\naddress = \"not an address\"\n");
        assert!(Settings::from_file(file.path()).is_err());
    }
}
