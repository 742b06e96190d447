//! Argument vectors, environments, and shell rendering.

use std::collections::BTreeMap;
use std::fmt;

use model::Secret;

/// Where a synthesized command has to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Venue {
    /// On the job's SSH host, through the session.
    Remote,
    /// On the machine running the engine (pull mode).
    Local,
}

impl Venue {
    /// Lowercase name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

/// A program and its arguments.
///
/// Arguments never hold secret material; rendering the line for logs is safe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Starts a command line for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments, without the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Replaces every occurrence of `placeholder` in the program and arguments.
    #[must_use]
    pub fn substitute(&self, placeholder: &str, value: &str) -> Self {
        Self {
            program: self.program.replace(placeholder, value),
            args: self
                .args
                .iter()
                .map(|arg| arg.replace(placeholder, value))
                .collect(),
        }
    }

    /// Renders the line for a POSIX shell.
    #[must_use]
    pub fn render(&self) -> String {
        let mut rendered = shell_quote(&self.program);
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&shell_quote(arg));
        }
        rendered
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Environment variables handed to a command.
///
/// Values are treated as sensitive: `Debug` lists names only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, Secret>,
}

impl Environment {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Secret>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Sets `name` when `value` is present and non-empty.
    pub fn set_opt(&mut self, name: &str, value: Option<&Secret>) {
        if let Some(value) = value.filter(|value| !value.is_empty()) {
            self.vars.insert(name.to_owned(), value.clone());
        }
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(Secret::expose)
    }

    /// Iterates `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .map(|(name, value)| (name.as_str(), value.expose()))
    }

    /// Iterates the variable names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Iterates the values as secrets, for redactor registration.
    pub fn values(&self) -> impl Iterator<Item = &Secret> {
        self.vars.values()
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Reports whether no variable is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Renders `export NAME='value'` statements, one per line.
    ///
    /// The result contains secrets and must only be written to a process's stdin.
    #[must_use]
    pub fn export_script(&self) -> String {
        self.iter().fold(String::new(), |mut script, (name, value)| {
            script.push_str("export ");
            script.push_str(name);
            script.push('=');
            script.push_str(&shell_quote(value));
            script.push('\n');
            script
        })
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.vars.keys()).finish()
    }
}

/// A command ready for dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesizedCommand {
    /// Program and arguments.
    pub line: CommandLine,
    /// Variables exported to the command.
    pub env: Environment,
    /// Where the command runs.
    pub venue: Venue,
}

impl SynthesizedCommand {
    /// A command without extra environment running on the SSH host.
    #[must_use]
    pub fn remote(line: CommandLine) -> Self {
        Self {
            line,
            env: Environment::new(),
            venue: Venue::Remote,
        }
    }

    /// A command without extra environment running locally.
    #[must_use]
    pub fn local(line: CommandLine) -> Self {
        Self {
            line,
            env: Environment::new(),
            venue: Venue::Local,
        }
    }

    /// Attaches an environment.
    #[must_use]
    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Short text naming the tool and subcommand, for log labels.
    ///
    /// Wrappers such as `sshpass` or `sh -c` are looked through.
    #[must_use]
    pub fn label(&self) -> String {
        let words: Vec<&str> = std::iter::once(self.line.program())
            .chain(self.line.arguments().iter().map(String::as_str))
            .flat_map(str::split_whitespace)
            .collect();
        let Some(position) = words
            .iter()
            .position(|word| matches!(*word, "borg" | "restic" | "rsync"))
        else {
            return self.line.program().to_owned();
        };
        match words.get(position + 1) {
            Some(sub) if !sub.starts_with('-') && !sub.contains(['/', ':']) => {
                format!("{} {sub}", words[position])
            }
            _ => words[position].to_owned(),
        }
    }
}

/// Quotes `value` for a POSIX shell, leaving plain words untouched.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value.bytes().all(|byte| {
            byte.is_ascii_alphanumeric()
                || matches!(byte, b'_' | b'-' | b'.' | b'/' | b':' | b'@' | b'%' | b'+' | b'=' | b',')
        });
    if plain {
        return value.to_owned();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}
