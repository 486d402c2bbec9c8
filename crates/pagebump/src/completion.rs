//! Shell completion generation.

use std::io;

use clap::Command;
use clap_complete::{generate, Shell};

/// Generate shell completion script.
pub fn generate_completion(cmd: &mut Command, shell: Shell, out: &mut dyn io::Write) {
    generate(shell, cmd, "pagebump", out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    use crate::config::AppConfig;

    #[test]
    fn generate_bash_completion() {
        let mut cmd = AppConfig::command();
        let mut buf = Vec::new();
        generate_completion(&mut cmd, Shell::Bash, &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("pagebump"));
        assert!(script.contains("split"));
    }
}
