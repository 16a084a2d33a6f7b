//! Trainer invocation.

use std::path::{Path, PathBuf};

use crate::config::TrainerConfig;

/// How to start the reconstruction trainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; inherits the parent's when unset
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl TrainerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    /// The nerfstudio invocation:
    /// `<program> <model> --data <dir> --max-num-iterations <steps> [extra...]
    /// nerfstudio-data --orientation-method none --center_method none`
    pub fn from_config(config: &TrainerConfig) -> Self {
        Self::new(config.program.clone())
            .arg(config.model.clone())
            .arg("--data")
            .arg(config.data_dir.clone())
            .arg("--max-num-iterations")
            .arg(config.steps.to_string())
            .args(config.extra_args.iter().cloned())
            .args(["nerfstudio-data", "--orientation-method", "none", "--center_method", "none"])
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_invocation() {
        let cmd = TrainerCommand::from_config(&TrainerConfig::default());
        assert_eq!(
            cmd.display(),
            "ns-train instant-ngp --data ./ --max-num-iterations 3500 nerfstudio-data \
             --orientation-method none --center_method none"
        );
        assert!(cmd.current_dir.is_none());
    }

    #[test]
    fn test_overridden_model_and_extra_args() {
        let config = TrainerConfig {
            model: "nerfacto".to_string(),
            steps: 100,
            extra_args: vec!["--viewer.quit-on-train-completion".to_string(), "True".to_string()],
            ..Default::default()
        };
        let cmd = TrainerCommand::from_config(&config).current_dir("/runs/a");
        assert_eq!(cmd.args[0], "nerfacto");
        assert_eq!(cmd.args[4], "100");
        assert_eq!(cmd.args[5], "--viewer.quit-on-train-completion");
        assert_eq!(cmd.args[7], "nerfstudio-data");
        assert_eq!(cmd.current_dir, Some(PathBuf::from("/runs/a")));
    }

    #[test]
    fn test_builder() {
        let cmd = TrainerCommand::new("sh").arg("-c").arg("true").env("A", "1");
        assert_eq!(cmd.args, vec!["-c", "true"]);
        assert_eq!(cmd.env, vec![("A".to_string(), "1".to_string())]);
    }
}
