use crate::{Error, Result};
use clap::{Arg, ArgMatches, Command, value_parser};
use std::time::Duration;

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE: &str = "mydb";
pub const DEFAULT_COLLECTION: &str = "test";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_APP_NAME: &str = "conditional-update";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub uri: String,
    pub database: String,
    pub collection: String,
    /// Upper bound for waiting on any single operation.
    pub timeout: Duration,
    pub app_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.into(),
            database: DEFAULT_DATABASE.into(),
            collection: DEFAULT_COLLECTION.into(),
            timeout: DEFAULT_TIMEOUT,
            app_name: DEFAULT_APP_NAME.into(),
        }
    }
}

impl Config {
    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn command() -> Command {
        Command::new("conditional-update")
            .about("Decrements a seat counter with a server-side conditional update")
            .arg(
                Arg::new("uri")
                    .help("Connection string (default: mongodb://localhost:27017)")
                    .env("MONGODB_URI"),
            )
            .arg(
                Arg::new("database")
                    .long("database")
                    .help("Database name (default: mydb)"),
            )
            .arg(
                Arg::new("collection")
                    .long("collection")
                    .help("Collection name (default: test)"),
            )
            .arg(
                Arg::new("timeout")
                    .long("timeout")
                    .value_name("SECS")
                    .help("Seconds to wait for each operation (default: 60)")
                    .value_parser(value_parser!(u64)),
            )
            .arg(
                Arg::new("app-name")
                    .long("app-name")
                    .help("Application name reported to the server"),
            )
    }

    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let defaults = Self::default();

        let string = |id: &str, default: String| {
            matches.get_one::<String>(id).cloned().unwrap_or(default)
        };

        let timeout = match matches.get_one::<u64>("timeout") {
            Some(0) => return Err(Error::Config("timeout must be at least one second".into())),
            Some(secs) => Duration::from_secs(*secs),
            None => defaults.timeout,
        };

        let config = Self {
            uri: string("uri", defaults.uri),
            database: string("database", defaults.database),
            collection: string("collection", defaults.collection),
            timeout,
            app_name: string("app-name", defaults.app_name),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command()
            .try_get_matches_from(args)
            .map_err(|error| Error::Config(error.to_string()))?;

        Self::from_matches(&matches)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.uri.starts_with("mongodb://") || self.uri.starts_with("mongodb+srv://")) {
            return Err(Error::Config(format!(
                "connection string must start with mongodb:// or mongodb+srv://, got `{}`",
                self.uri
            )));
        }

        if self.database.is_empty() || self.collection.is_empty() {
            return Err(Error::Config(
                "database and collection names must not be empty".into(),
            ));
        }

        Ok(())
    }
}
