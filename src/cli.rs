use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    /// Queries to answer non-interactively; empty means read them from stdin.
    pub queries: Vec<String>,
    pub verbose_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

pub fn create_cli() -> Command {
    Command::new("dcSim")
        .version(crate::VERSION)
        .about(crate::DESCRIPTION)
        .arg(
            Arg::new("input")
                .help("Circuit deck: one line per node listing its elements (first node is ground)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Export the solved circuit to FILE"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
        .arg(
            Arg::new("query")
                .short('q')
                .long("query")
                .value_name("QUERY")
                .action(ArgAction::Append)
                .help("Answer QUERY (e.g. \"I R1\", \"E1 V R2\", \"MP R3\") instead of reading stdin"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input deck is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("json") => OutputFormat::Json,
            Some("csv") | None => OutputFormat::Csv,
            Some(other) => return Err(anyhow!("Invalid output format '{}'", other)),
        };

        let queries = matches
            .get_many::<String>("query")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        Ok(CliArgs {
            input_file,
            output_file,
            output_format,
            queries,
            verbose_level: matches.get_count("verbose"),
        })
    }

    /// Log level implied by the number of `-v` flags.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose_level {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let matches = create_cli().try_get_matches_from(["dcSim", "deck.txt"]).unwrap();
        let args = CliArgs::from_matches(&matches).unwrap();

        assert_eq!(args.input_file, "deck.txt");
        assert_eq!(args.output_file, None);
        assert_eq!(args.output_format, OutputFormat::Csv);
        assert!(args.queries.is_empty());
        assert_eq!(args.log_level(), LevelFilter::Warn);
    }

    #[test]
    fn test_queries_and_format() {
        let matches = create_cli()
            .try_get_matches_from([
                "dcSim", "deck.txt", "-q", "I R1", "-q", "MP R2", "-o", "out.json", "-f", "json", "-vv",
            ])
            .unwrap();
        let args = CliArgs::from_matches(&matches).unwrap();

        assert_eq!(args.queries, vec!["I R1".to_string(), "MP R2".to_string()]);
        assert_eq!(args.output_file.as_deref(), Some("out.json"));
        assert_eq!(args.output_format, OutputFormat::Json);
        assert_eq!(args.log_level(), LevelFilter::Debug);
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(create_cli()
            .try_get_matches_from(["dcSim", "deck.txt", "-f", "xml"])
            .is_err());
    }
}
