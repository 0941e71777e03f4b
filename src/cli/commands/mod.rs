pub mod keys;
pub mod logging;
pub mod session;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_MEMORY_STORE: &str = "memory-store";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("sesame")
        .about("Session tokens and one-time authorization codes")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("SESAME_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("SESAME_DSN")
                .hide_env_values(true)
                .required_unless_present(ARG_MEMORY_STORE),
        )
        .arg(
            Arg::new(ARG_MEMORY_STORE)
                .long(ARG_MEMORY_STORE)
                .help("Keep users in memory instead of PostgreSQL (development only)")
                .env("SESAME_MEMORY_STORE")
                .action(ArgAction::SetTrue)
                .conflicts_with(ARG_DSN),
        );

    let command = keys::with_args(command);
    let command = session::with_args(command);
    logging::with_args(command)
}
