//! Signing keys and token lifetimes.

use anyhow::{bail, Context};
use clap::{Arg, ArgMatches, Command};
use secrecy::{ExposeSecret, SecretString};
use std::{fs, path::PathBuf, time::Duration};

use crate::token::Algorithm;

pub const ARG_PRIVATE_KEY: &str = "private-key";
pub const ARG_PRIVATE_KEY_PATH: &str = "private-key-path";
pub const ARG_PUBLIC_KEY: &str = "public-key";
pub const ARG_PUBLIC_KEY_PATH: &str = "public-key-path";
pub const ARG_ALGORITHM: &str = "algorithm";
pub const ARG_TOKEN_TTL_MINUTES: &str = "token-ttl-minutes";
pub const ARG_CODE_TTL_SECONDS: &str = "code-ttl-seconds";

/// Where a key comes from: the value itself or a file holding it.
#[derive(Debug)]
pub enum KeySource {
    Inline(SecretString),
    File(PathBuf),
}

impl KeySource {
    /// Read the PEM or DER bytes.
    ///
    /// # Errors
    /// Returns an error if the key file cannot be read.
    pub fn read(&self) -> anyhow::Result<Vec<u8>> {
        match self {
            Self::Inline(pem) => Ok(pem.expose_secret().as_bytes().to_vec()),
            Self::File(path) => fs::read(path)
                .with_context(|| format!("failed to read key file {}", path.display())),
        }
    }
}

#[derive(Debug)]
pub struct Options {
    pub private_key: Option<KeySource>,
    pub public_key: Option<KeySource>,
    pub algorithm: Algorithm,
    pub token_ttl: Duration,
    pub code_ttl: Duration,
}

impl Options {
    /// Parse key arguments from matches.
    ///
    /// # Errors
    /// Returns an error if no key is configured or the algorithm is unknown.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let source = |inline: &str, path: &str| {
            get_non_empty(inline)
                .map(|pem| KeySource::Inline(SecretString::from(pem)))
                .or_else(|| get_non_empty(path).map(|path| KeySource::File(PathBuf::from(path))))
        };

        let private_key = source(ARG_PRIVATE_KEY, ARG_PRIVATE_KEY_PATH);
        let public_key = source(ARG_PUBLIC_KEY, ARG_PUBLIC_KEY_PATH);

        if private_key.is_none() && public_key.is_none() {
            bail!(
                "missing required argument: --{ARG_PRIVATE_KEY}, --{ARG_PRIVATE_KEY_PATH}, --{ARG_PUBLIC_KEY} or --{ARG_PUBLIC_KEY_PATH}"
            );
        }

        let algorithm = get_non_empty(ARG_ALGORITHM)
            .map(|value| value.parse::<Algorithm>())
            .transpose()?
            .unwrap_or_default();

        let token_ttl_minutes = matches
            .get_one::<u64>(ARG_TOKEN_TTL_MINUTES)
            .copied()
            .unwrap_or(30);
        let code_ttl_seconds = matches
            .get_one::<u64>(ARG_CODE_TTL_SECONDS)
            .copied()
            .unwrap_or(60);

        Ok(Self {
            private_key,
            public_key,
            algorithm,
            token_ttl: Duration::from_secs(token_ttl_minutes.saturating_mul(60)),
            code_ttl: Duration::from_secs(code_ttl_seconds),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PRIVATE_KEY)
                .long(ARG_PRIVATE_KEY)
                .help("RSA private key (PEM) used to sign session tokens")
                .env("SESAME_PRIVATE_KEY")
                .hide_env_values(true)
                .allow_hyphen_values(true)
                .conflicts_with(ARG_PRIVATE_KEY_PATH),
        )
        .arg(
            Arg::new(ARG_PRIVATE_KEY_PATH)
                .long(ARG_PRIVATE_KEY_PATH)
                .help("Path to the RSA private key (PEM or DER)")
                .env("SESAME_PRIVATE_KEY_PATH"),
        )
        .arg(
            Arg::new(ARG_PUBLIC_KEY)
                .long(ARG_PUBLIC_KEY)
                .help("RSA public key (PEM) used to verify session tokens")
                .long_help(
                    "RSA public key (PEM) used to verify session tokens.\n\nDerived from the private key when omitted. When both keys are given they are checked against each other at startup. With only a public key the service can verify but not issue tokens.",
                )
                .env("SESAME_PUBLIC_KEY")
                .allow_hyphen_values(true)
                .conflicts_with(ARG_PUBLIC_KEY_PATH),
        )
        .arg(
            Arg::new(ARG_PUBLIC_KEY_PATH)
                .long(ARG_PUBLIC_KEY_PATH)
                .help("Path to the RSA public key (PEM or DER)")
                .env("SESAME_PUBLIC_KEY_PATH"),
        )
        .arg(
            Arg::new(ARG_ALGORITHM)
                .long(ARG_ALGORITHM)
                .help("Token signature algorithm")
                .env("SESAME_ALGORITHM")
                .default_value("RS256")
                .value_parser(["RS256", "RS384", "RS512"])
                .ignore_case(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_MINUTES)
                .long(ARG_TOKEN_TTL_MINUTES)
                .help("Session token lifetime in minutes")
                .env("SESAME_TOKEN_TTL_MINUTES")
                .default_value("30")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CODE_TTL_SECONDS)
                .long(ARG_CODE_TTL_SECONDS)
                .help("Authorization code lifetime in seconds")
                .env("SESAME_CODE_TTL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
