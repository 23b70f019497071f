use crate::constants::RECURSIVE_FLAG;
use crate::core_error::ClientError;

pub const HELP_TEXT: &str = "Available commands:
exit - Quit the application.
cd <path> - Change remote directory.
lcd [path] - Change local directory (defaults to $HOME).
pwd - Display remote working directory.
lpwd - Display local working directory.
ls [path] - List remote directory contents.
mkdir <path> - Create remote directory.
lmkdir <path> - Create local directory.
get [-R] <remote-path> [local-path] - Retrieve remote file/directory.
put [-R] <local-path> [remote-path] - Upload file/directory.
help - Display this help text.
Quote paths that contain spaces: put \"my notes.txt\" \"notes 2024.txt\"";

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Exit,
    Help,
    Cd(String),
    Pwd,
    Ls(Option<String>),
    Mkdir(String),
    Get {
        remote: String,
        local: Option<String>,
        recursive: bool,
    },
    Put {
        local: String,
        remote: Option<String>,
        recursive: bool,
    },
    /// `lcd` without a path goes to the home directory.
    LocalCd(Option<String>),
    LocalPwd,
    LocalMkdir(String),
}

struct Token {
    text: String,
    quoted: bool,
}

/// Splits a user line on whitespace. Single or double quotes keep spaces in a
/// token, and a backslash outside single quotes takes the next character as is.
fn tokenize(line: &str) -> Result<Vec<Token>, ClientError> {
    let mut tokens = Vec::new();
    let mut current: Option<Token> = None;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('\''), c) => current.get_or_insert_with(empty_token).text.push(c),
            (_, '\\') => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| ClientError::Usage("Trailing backslash.".to_string()))?;
                current.get_or_insert_with(empty_token).text.push(escaped);
            }
            (Some(_), c) => current.get_or_insert_with(empty_token).text.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.get_or_insert_with(empty_token).quoted = true;
            }
            (None, c) if c.is_whitespace() => tokens.extend(current.take()),
            (None, c) => current.get_or_insert_with(empty_token).text.push(c),
        }
    }
    if quote.is_some() {
        return Err(ClientError::Usage("Unterminated quote.".to_string()));
    }
    tokens.extend(current);
    Ok(tokens)
}

fn empty_token() -> Token {
    Token {
        text: String::new(),
        quoted: false,
    }
}

impl ClientCommand {
    /// Parses a user line. An unquoted `-R` token is the recursion flag
    /// wherever it appears; every other token is positional.
    pub fn parse(line: &str) -> Result<ClientCommand, ClientError> {
        let mut tokens = tokenize(line)?.into_iter();
        let verb = tokens
            .next()
            .ok_or_else(|| ClientError::Usage("Empty command.".to_string()))?
            .text;
        let verb = verb.as_str();

        let mut recursive = false;
        let mut positional = Vec::new();
        for token in tokens {
            if token.text == RECURSIVE_FLAG && !token.quoted {
                recursive = true;
            } else {
                positional.push(token.text);
            }
        }

        if recursive && !matches!(verb, "get" | "put") {
            return Err(usage(verb, "does not take -R"));
        }

        let mut positional = positional.into_iter();
        let first = positional.next();
        let second = positional.next();
        if positional.next().is_some() {
            return Err(usage(verb, "takes at most two paths"));
        }

        let command = match (verb, first, second) {
            ("exit", None, None) => ClientCommand::Exit,
            ("help", None, None) => ClientCommand::Help,
            ("pwd", None, None) => ClientCommand::Pwd,
            ("lpwd", None, None) => ClientCommand::LocalPwd,
            ("cd", Some(path), None) => ClientCommand::Cd(path),
            ("lcd", path, None) => ClientCommand::LocalCd(path),
            ("ls", path, None) => ClientCommand::Ls(path),
            ("mkdir", Some(path), None) => ClientCommand::Mkdir(path),
            ("lmkdir", Some(path), None) => ClientCommand::LocalMkdir(path),
            ("get", Some(remote), local) => ClientCommand::Get {
                remote,
                local,
                recursive,
            },
            ("put", Some(local), remote) => ClientCommand::Put {
                local,
                remote,
                recursive,
            },
            (
                "exit" | "help" | "pwd" | "lpwd" | "cd" | "lcd" | "ls" | "mkdir" | "lmkdir"
                | "get" | "put",
                _,
                _,
            ) => return Err(usage(verb, "has wrong arguments, see help")),
            _ => return Err(ClientError::Usage(format!("Unknown command: {}", verb))),
        };
        Ok(command)
    }
}

fn usage(verb: &str, problem: &str) -> ClientError {
    ClientError::Usage(format!("{} {}", verb, problem))
}
