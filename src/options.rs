use clap::Parser;

/// AA55 Bridge - polls a GoodWe inverter over the AA55 UDP protocol
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Optional runtime limit in seconds
    #[clap(short = 't', long = "time")]
    pub runtime: Option<u64>,

    /// Print the inverter identity and one running snapshot, then exit
    #[clap(long = "diagnostics")]
    pub diagnostics: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::parse_from(["aa55-bridge"]);
        assert_eq!(options.config_file, "config.yaml");
        assert_eq!(options.runtime, None);
        assert!(!options.diagnostics);
    }

    #[test]
    fn all_flags() {
        let options =
            Options::parse_from(["aa55-bridge", "-c", "/etc/aa55.yaml", "-t", "60", "--diagnostics"]);
        assert_eq!(options.config_file, "/etc/aa55.yaml");
        assert_eq!(options.runtime, Some(60));
        assert!(options.diagnostics);
    }
}
