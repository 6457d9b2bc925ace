//! Command-line argument parsing for the opengloves CLI.

use std::path::PathBuf;

/// Options for `opengloves chat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatArgs {
    pub config: Option<PathBuf>,
    /// Chat thread to use instead of `ui.sessionKey`.
    pub session: Option<String>,
    /// Gateway URL to use instead of `gateway.url`.
    pub url: Option<String>,
    /// Prompt for the gateway password instead of using the configured token.
    pub ask_password: bool,
    /// Relay HTTP base URL whose access gate must be passed first.
    pub access_url: Option<String>,
}

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Show version information
    Version,
    /// Show usage
    Help,
    /// Run the relay server
    Relay { config: Option<PathBuf> },
    /// Run the line-oriented chat client
    Chat(ChatArgs),
    /// Arguments could not be parsed
    Invalid(String),
}

pub const USAGE: &str = "\
Usage:
  opengloves relay [--config PATH]
  opengloves chat [--config PATH] [--session KEY] [--url URL] [--ask-password] [--access URL]
  opengloves --version
  opengloves --help";

/// Parse command-line arguments and return the appropriate command.
///
/// # Examples
///
/// ```
/// use opengloves::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["opengloves".to_string(), "--version".to_string()];
/// assert_eq!(parse_args(args.into_iter()), CliCommand::Version);
/// ```
pub fn parse_args<I>(args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    // Skip the program name
    let mut args = args.skip(1);
    let Some(first) = args.next() else {
        return CliCommand::Help;
    };

    match first.as_str() {
        "--version" | "-V" => CliCommand::Version,
        "--help" | "-h" | "help" => CliCommand::Help,
        "relay" => parse_relay(args),
        "chat" => parse_chat(args),
        other => CliCommand::Invalid(format!("Unknown command '{}'", other)),
    }
}

fn parse_relay<I>(mut args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => return missing_value(&arg),
            },
            other => return CliCommand::Invalid(format!("Unknown relay option '{}'", other)),
        }
    }
    CliCommand::Relay { config }
}

fn parse_chat<I>(mut args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    let mut chat = ChatArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--ask-password" => chat.ask_password = true,
            "--config" | "-c" | "--session" | "-s" | "--url" | "--access" => {
                let Some(value) = args.next() else {
                    return missing_value(&arg);
                };
                match arg.as_str() {
                    "--config" | "-c" => chat.config = Some(PathBuf::from(value)),
                    "--session" | "-s" => chat.session = Some(value),
                    "--url" => chat.url = Some(value),
                    _ => chat.access_url = Some(value),
                }
            }
            other => return CliCommand::Invalid(format!("Unknown chat option '{}'", other)),
        }
    }
    CliCommand::Chat(chat)
}

fn missing_value(flag: &str) -> CliCommand {
    CliCommand::Invalid(format!("{} needs a value", flag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliCommand {
        let mut all = vec!["opengloves".to_string()];
        all.extend(args.iter().map(|a| a.to_string()));
        parse_args(all.into_iter())
    }

    #[test]
    fn test_parse_version_flags() {
        assert_eq!(parse(&["--version"]), CliCommand::Version);
        assert_eq!(parse(&["-V"]), CliCommand::Version);
    }

    #[test]
    fn test_parse_no_args_shows_help() {
        assert_eq!(parse(&[]), CliCommand::Help);
        assert_eq!(parse(&["--help"]), CliCommand::Help);
    }

    #[test]
    fn test_parse_relay() {
        assert_eq!(parse(&["relay"]), CliCommand::Relay { config: None });
        assert_eq!(
            parse(&["relay", "--config", "/etc/og.json"]),
            CliCommand::Relay {
                config: Some(PathBuf::from("/etc/og.json"))
            }
        );
    }

    #[test]
    fn test_parse_chat_options() {
        let command = parse(&[
            "chat",
            "-s",
            "work",
            "--url",
            "ws://relay:8080/ws",
            "--ask-password",
            "--access",
            "http://relay:8080",
        ]);
        assert_eq!(
            command,
            CliCommand::Chat(ChatArgs {
                config: None,
                session: Some("work".to_string()),
                url: Some("ws://relay:8080/ws".to_string()),
                ask_password: true,
                access_url: Some("http://relay:8080".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_missing_value() {
        assert_eq!(
            parse(&["chat", "--session"]),
            CliCommand::Invalid("--session needs a value".to_string())
        );
        assert!(matches!(parse(&["relay", "-c"]), CliCommand::Invalid(_)));
    }

    #[test]
    fn test_parse_unknown_input() {
        assert!(matches!(parse(&["serve"]), CliCommand::Invalid(_)));
        assert!(matches!(parse(&["relay", "--port", "1"]), CliCommand::Invalid(_)));
    }
}
