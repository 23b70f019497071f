use crate::constants::RECURSIVE_FLAG;
use crate::core_error::CommandError;
use std::fmt;

/// Verbs understood by the server. Matching is case-sensitive.
#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
pub enum Verb {
    Exit,
    Cd,
    Pwd,
    Ls,
    Mkdir,
    Get,
    Put,
}

impl Verb {
    pub fn from_str(verb: &str) -> Option<Verb> {
        match verb {
            "exit" => Some(Verb::Exit),
            "cd" => Some(Verb::Cd),
            "pwd" => Some(Verb::Pwd),
            "ls" => Some(Verb::Ls),
            "mkdir" => Some(Verb::Mkdir),
            "get" => Some(Verb::Get),
            "put" => Some(Verb::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Exit => "exit",
            Verb::Cd => "cd",
            Verb::Pwd => "pwd",
            Verb::Ls => "ls",
            Verb::Mkdir => "mkdir",
            Verb::Get => "get",
            Verb::Put => "put",
        }
    }
}

/// A command line split into its verb and at most two arguments.
///
/// The line is cut at its first two spaces. `arg2` is everything after the
/// second cut, kept byte for byte, so a path may contain any run of spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub verb: String,
    pub arg1: Option<String>,
    pub arg2: Option<String>,
}

impl RawCommand {
    pub fn split(line: &str) -> RawCommand {
        let line = line.trim_matches(|c| c == '\r' || c == '\n');
        let (verb, rest) = split_token(line);
        let (arg1, arg2) = split_token(rest);
        RawCommand {
            verb: verb.to_string(),
            arg1: non_empty(arg1),
            arg2: non_empty(arg2),
        }
    }

    /// The positional path: `arg1`, extended by `arg2` when both are present.
    fn path(&self) -> Option<String> {
        match (&self.arg1, &self.arg2) {
            (Some(a), Some(b)) => Some(format!("{} {}", a, b)),
            (Some(a), None) => Some(a.clone()),
            _ => None,
        }
    }

    /// Splits off a leading `-R` flag and returns the remaining path.
    fn flagged_path(&self) -> (bool, Option<String>) {
        if self.arg1.as_deref() == Some(RECURSIVE_FLAG) {
            (true, self.arg2.clone())
        } else {
            (false, self.path())
        }
    }
}

fn split_token(text: &str) -> (&str, &str) {
    text.split_once(' ').unwrap_or((text, ""))
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// A parsed client request. Built once at the boundary, never re-split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Cd { path: String },
    Pwd,
    Ls { path: Option<String>, recursive: bool },
    Mkdir { path: String },
    Get { path: String, recursive: bool },
    Put { path: String, recursive: bool },
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        let raw = RawCommand::split(line);
        let verb =
            Verb::from_str(&raw.verb).ok_or_else(|| CommandError::Protocol(raw.verb.clone()))?;

        let command = match verb {
            Verb::Exit => Command::Exit,
            Verb::Pwd => Command::Pwd,
            Verb::Cd => Command::Cd {
                path: raw.path().ok_or(CommandError::MissingArgument)?,
            },
            Verb::Mkdir => Command::Mkdir {
                path: raw.path().ok_or(CommandError::MissingArgument)?,
            },
            Verb::Ls => {
                let (recursive, path) = raw.flagged_path();
                if recursive && path.is_none() {
                    return Err(CommandError::MissingArgument);
                }
                Command::Ls { path, recursive }
            }
            Verb::Get => {
                let (recursive, path) = raw.flagged_path();
                Command::Get {
                    path: path.ok_or(CommandError::MissingArgument)?,
                    recursive,
                }
            }
            Verb::Put => {
                let (recursive, path) = raw.flagged_path();
                Command::Put {
                    path: path.ok_or(CommandError::MissingArgument)?,
                    recursive,
                }
            }
        };
        Ok(command)
    }

    pub fn verb(&self) -> Verb {
        match self {
            Command::Exit => Verb::Exit,
            Command::Cd { .. } => Verb::Cd,
            Command::Pwd => Verb::Pwd,
            Command::Ls { .. } => Verb::Ls,
            Command::Mkdir { .. } => Verb::Mkdir,
            Command::Get { .. } => Verb::Get,
            Command::Put { .. } => Verb::Put,
        }
    }

    /// Encodes the command as its single wire line.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = self.verb().as_str();
        match self {
            Command::Exit | Command::Pwd => write!(f, "{}", verb),
            Command::Cd { path } | Command::Mkdir { path } => write!(f, "{} {}", verb, path),
            Command::Ls { path: None, .. } => write!(f, "{}", verb),
            Command::Ls {
                path: Some(path),
                recursive,
            }
            | Command::Get { path, recursive }
            | Command::Put { path, recursive } => {
                if *recursive {
                    write!(f, "{} {} {}", verb, RECURSIVE_FLAG, path)
                } else {
                    write!(f, "{} {}", verb, path)
                }
            }
        }
    }
}
