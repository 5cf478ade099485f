use std::fmt;

const MASK: &str = "*****";

/// A command line destined for a remote shell, kept in two renderings: the
/// real string handed to the transport and a redacted twin for logs and
/// error messages. Secrets only ever reach the rendered form.
#[derive(Clone)]
pub struct RemoteCommand {
    rendered: String,
    redacted: String,
}

impl RemoteCommand {
    pub fn program(name: &str) -> Self {
        let quoted = sh_quote(name);
        Self {
            rendered: quoted.clone(),
            redacted: quoted,
        }
    }

    /// Wraps an operator-authored shell fragment verbatim, as hook commands
    /// are written in shell already.
    pub fn raw(fragment: &str) -> Self {
        Self {
            rendered: fragment.to_string(),
            redacted: fragment.to_string(),
        }
    }

    /// Appends a shell-quoted argument.
    pub fn arg(mut self, value: &str) -> Self {
        let quoted = sh_quote(value);
        self.push(&quoted, &quoted);
        self
    }

    /// Appends a trusted literal such as a flag, verbatim.
    pub fn flag(mut self, value: &str) -> Self {
        self.push(value, value);
        self
    }

    /// Appends an argument whose value must never appear in logs.
    pub fn secret_arg(mut self, value: &str) -> Self {
        self.push(&sh_quote(value), MASK);
        self
    }

    /// Appends a secret fused to its flag, `-pSECRET` style.
    pub fn fused_secret(mut self, prefix: &str, value: &str) -> Self {
        let rendered = sh_quote(&format!("{prefix}{value}"));
        self.push(&rendered, &format!("{prefix}{MASK}"));
        self
    }

    /// Chains another command behind `&&`.
    pub fn then(mut self, next: RemoteCommand) -> Self {
        self.rendered.push_str(" && ");
        self.rendered.push_str(&next.rendered);
        self.redacted.push_str(" && ");
        self.redacted.push_str(&next.redacted);
        self
    }

    /// The real command line. Only the shell transport reads this.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    /// The loggable command line, secrets masked.
    pub fn redacted(&self) -> &str {
        &self.redacted
    }

    fn push(&mut self, rendered: &str, redacted: &str) {
        self.rendered.push(' ');
        self.rendered.push_str(rendered);
        self.redacted.push(' ');
        self.redacted.push_str(redacted);
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted)
    }
}

impl fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteCommand").field(&self.redacted).finish()
    }
}

/// Minimal POSIX quoting: plain tokens pass through untouched, everything
/// else is single-quoted with embedded quotes escaped.
pub(crate) fn sh_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value.chars().all(|ch| {
            ch.is_ascii_alphanumeric()
                || matches!(ch, '_' | '-' | '+' | '=' | ':' | ',' | '.' | '/' | '@' | '%')
        });
    if plain {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}
