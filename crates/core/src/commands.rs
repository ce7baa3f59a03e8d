// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote command plans
//!
//! Setup and launch commands are Jinja2-style templates rendered per job:
//!
//! - `{{ job_id }}`, `{{ source_reference }}`, `{{ worker_id }}`
//! - any key from `commands.vars`
//! - `{{ value | shquote }}` wraps a value in single quotes for the remote shell
//!
//! Undefined variables are an error, so a typo never reaches a worker as an
//! empty argument.

use crate::config::CommandsConfig;
use crate::job::Job;
use crate::worker::WorkerId;
use minijinja::{Environment, UndefinedBehavior};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template syntax error in {label}: {message}")]
    Syntax { label: String, message: String },

    #[error("undefined variable in {label}: {message}")]
    UndefinedVariable { label: String, message: String },

    #[error("render error in {label}: {message}")]
    Render { label: String, message: String },
}

impl TemplateError {
    fn from_minijinja(label: &str, err: minijinja::Error) -> Self {
        let label = label.to_string();
        let message = err.to_string();
        match err.kind() {
            minijinja::ErrorKind::SyntaxError => TemplateError::Syntax { label, message },
            minijinja::ErrorKind::UndefinedError => {
                TemplateError::UndefinedVariable { label, message }
            }
            _ => TemplateError::Render { label, message },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Must exit 0 before the next command runs
    Setup,
    /// Started detached; its exit status is never observed
    Launch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub label: String,
    pub script: String,
    pub kind: CommandKind,
}

/// Rendered commands for one job on one worker, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    pub setup: Vec<RemoteCommand>,
    pub launch: RemoteCommand,
}

impl CommandPlan {
    pub fn render(
        config: &CommandsConfig,
        job: &Job,
        worker_id: &WorkerId,
    ) -> Result<Self, TemplateError> {
        let env = environment();
        let mut context = config.vars.clone();
        context.insert("job_id".to_string(), job.id.to_string());
        context.insert("source_reference".to_string(), job.source_reference.clone());
        context.insert("worker_id".to_string(), worker_id.to_string());

        let setup = config
            .setup
            .iter()
            .enumerate()
            .map(|(i, template)| {
                let label = format!("setup[{}]", i + 1);
                let script = render(&env, &label, template, &context)?;
                Ok(RemoteCommand {
                    label,
                    script,
                    kind: CommandKind::Setup,
                })
            })
            .collect::<Result<Vec<_>, TemplateError>>()?;

        let launch = render(&env, "launch", &config.launch, &context)?;
        let log = render(&env, "launch_log", &config.launch_log, &context)?;

        Ok(Self {
            setup,
            launch: RemoteCommand {
                label: "launch".to_string(),
                script: detached(&launch, &log),
                kind: CommandKind::Launch,
            },
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteCommand> {
        self.setup.iter().chain(std::iter::once(&self.launch))
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_filter("shquote", shquote);
    env
}

fn render(
    env: &Environment<'_>,
    label: &str,
    template: &str,
    context: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    env.render_str(template, context)
        .map_err(|e| TemplateError::from_minijinja(label, e))
}

/// Quote a value as a single POSIX shell word
pub fn shquote(value: String) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Wrap `script` so it survives the session closing and returns at once
fn detached(script: &str, log: &str) -> String {
    format!(
        "nohup sh -c {} > {} 2>&1 < /dev/null &",
        shquote(script.to_string()),
        log
    )
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
