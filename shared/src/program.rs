//! Program model and script decoding
//!
//! A program is an ordered list of commands. Scripts are plain text with one
//! command per line:
//! ```text
//! work 2000
//! work 5000
//! ```
//! The first space-separated token is the command name and the rest are its
//! parameters. There is no quoting, escaping or comment syntax. Programs can
//! also be stored as a JSON array of `{"cmd": .., "params": [..]}` objects.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ProgramError;

/// A single device command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "cmd")]
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl Command {
    pub fn new<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered command list; execution order is insertion order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    commands: Vec<Command>,
}

impl Program {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Command at a program counter value, if it points inside the program
    pub fn get(&self, index: i64) -> Option<&Command> {
        usize::try_from(index).ok().and_then(|i| self.commands.get(i))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    /// Decode a JSON array of commands
    pub fn from_json(json: &str) -> Result<Self, ProgramError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as a JSON array of commands
    pub fn to_json(&self) -> Result<String, ProgramError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<Vec<Command>> for Program {
    fn from(commands: Vec<Command>) -> Self {
        Self::new(commands)
    }
}

impl FromIterator<Command> for Program {
    fn from_iter<T: IntoIterator<Item = Command>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Parse script text into a program, one command per line
pub fn parse_program(text: &str) -> Program {
    text.split('\n')
        .map(|line| {
            let mut tokens = line.split(' ');
            let name = tokens.next().unwrap_or_default();
            Command::new(name, tokens)
        })
        .collect()
}

/// Load a program from disk; `.json` files are decoded as JSON, anything
/// else as script text
pub fn load_program(path: impl AsRef<Path>) -> Result<Program, ProgramError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        Program::from_json(&text)
    } else {
        Ok(parse_program(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let program = parse_program("work 2000\nwork 5000\nping");
        assert_eq!(program.len(), 3);
        assert_eq!(program.get(0), Some(&Command::new("work", ["2000"])));
        assert_eq!(program.get(1), Some(&Command::new("work", ["5000"])));
        assert_eq!(program.get(2), Some(&Command::new("ping", Vec::<String>::new())));
        assert_eq!(program.get(3), None);
        assert_eq!(program.get(-1), None);
    }

    #[test]
    fn test_parse_empty_line() {
        let program = parse_program("ping\n\nping");
        assert_eq!(program.len(), 3);
        let empty = program.get(1).unwrap();
        assert_eq!(empty.name, "");
        assert!(empty.params.is_empty());

        // Empty text is a single empty command
        let program = parse_program("");
        assert_eq!(program.len(), 1);
        assert_eq!(program.get(0).unwrap().name, "");
    }

    #[test]
    fn test_parse_single_space_split() {
        // Consecutive spaces produce empty parameters
        let program = parse_program("move  10");
        assert_eq!(program.get(0).unwrap().params, vec!["", "10"]);
    }

    #[test]
    fn test_json_format() {
        let program = Program::from_json(
            r#"[{"cmd": "work", "params": ["100"]}, {"cmd": "ping"}]"#,
        )
        .unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program.get(1), Some(&Command::new("ping", Vec::<String>::new())));

        let json = program.to_json().unwrap();
        assert_eq!(json, r#"[{"cmd":"work","params":["100"]},{"cmd":"ping","params":[]}]"#);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            Program::from_json("{\"cmd\": 1}"),
            Err(ProgramError::Json(_))
        ));
    }

    #[test]
    fn test_load_program_by_extension() {
        let dir = std::env::temp_dir().join(format!("stepwise-load-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let script = dir.join("prog.txt");
        std::fs::write(&script, "work 100").unwrap();
        assert_eq!(load_program(&script).unwrap().len(), 1);

        let json = dir.join("prog.json");
        std::fs::write(&json, r#"[{"cmd":"a"},{"cmd":"b"}]"#).unwrap();
        assert_eq!(load_program(&json).unwrap().len(), 2);

        assert!(matches!(load_program(dir.join("missing.txt")), Err(ProgramError::Io(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
