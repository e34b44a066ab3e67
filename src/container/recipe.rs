//! Structured image recipes
//!
//! A recipe is a base image plus ordered setup steps. It renders to a
//! Dockerfile deterministically, so two equal recipes always produce the same
//! text, digest and image tag.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const IMAGE_REPOSITORY: &str = "unitgraph-toolchain";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SetupStep {
    /// Runs an argument vector (exec form, no shell parsing).
    Run { args: Vec<String> },
    Env { key: String, value: String },
    Workdir { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildRecipe {
    pub base_image: String,
    #[serde(default)]
    pub steps: Vec<SetupStep>,
}

impl BuildRecipe {
    pub fn new(base_image: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
            steps: Vec::new(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.steps.push(SetupStep::Env {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn run<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(SetupStep::Run {
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn workdir(mut self, path: impl Into<String>) -> Self {
        self.steps.push(SetupStep::Workdir { path: path.into() });
        self
    }

    pub fn to_dockerfile(&self) -> String {
        let mut out = format!("FROM {}\n", self.base_image);
        for step in &self.steps {
            let line = match step {
                SetupStep::Run { args } => format!("RUN {}", json_array(args)),
                SetupStep::Env { key, value } => format!("ENV {}={}", key, json_string(value)),
                SetupStep::Workdir { path } => format!("WORKDIR {}", path),
            };
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Hex sha256 of the rendered Dockerfile.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_dockerfile().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn image_tag(&self) -> String {
        format!("{}:{}", IMAGE_REPOSITORY, &self.digest()[..16])
    }
}

// JSON string syntax is what Dockerfile exec form and quoted ENV values expect.
fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn json_array(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| json_string(v)).collect();
    format!("[{}]", quoted.join(", "))
}
