use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_CORS_ORIGINS: &str = "cors-origins";
pub const ARG_COOKIE_DOMAIN: &str = "cookie-domain";
pub const ARG_PRODUCTION: &str = "production";
pub const ARG_REDIRECT_HOSTS: &str = "redirect-hosts";

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub cors_origins: Vec<String>,
    pub cookie_domain: Option<String>,
    pub production: bool,
    pub redirect_hosts: Vec<String>,
}

impl Options {
    /// Parse session and browser-facing arguments from matches.
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let list = |id: &str| -> Vec<String> {
            matches
                .get_many::<String>(id)
                .map(|values| {
                    values
                        .map(|value| value.trim())
                        .filter(|value| !value.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            cors_origins: list(ARG_CORS_ORIGINS),
            cookie_domain: matches
                .get_one::<String>(ARG_COOKIE_DOMAIN)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            production: matches.get_flag(ARG_PRODUCTION),
            redirect_hosts: list(ARG_REDIRECT_HOSTS),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CORS_ORIGINS)
                .long(ARG_CORS_ORIGINS)
                .help("Comma separated origins allowed to call the API with credentials")
                .env("SESAME_CORS_ORIGINS")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(ARG_COOKIE_DOMAIN)
                .long(ARG_COOKIE_DOMAIN)
                .help("Domain attribute for the session cookie")
                .env("SESAME_COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_PRODUCTION)
                .long(ARG_PRODUCTION)
                .help("Mark the session cookie Secure")
                .env("SESAME_PRODUCTION")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_REDIRECT_HOSTS)
                .long(ARG_REDIRECT_HOSTS)
                .help("Comma separated hosts an authorization code may be redirected to")
                .long_help(
                    "Comma separated hosts (optionally host:port) an authorization code may be redirected to.\n\nWhen empty any redirect_uri is accepted.",
                )
                .env("SESAME_REDIRECT_HOSTS")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
}
