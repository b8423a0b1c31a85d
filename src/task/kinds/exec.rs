//! Run an external command per binding.

use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::process::ChildCommand;
use crate::task::{json_to_string, Binding, Options, Task, TaskKind};
use crate::tools;
use kombi_element::Element;
use kombi_template::{Scope, Template};

/// Runs `command` with `args`, both templates evaluated against the
/// binding's variables. A bare command name is resolved through
/// `KOMBI_<NAME>_EXECUTABLE` or `PATH`.
pub struct ExecTask;

fn resolve_program(command: &str) -> Result<PathBuf> {
    if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
        Ok(PathBuf::from(command))
    } else {
        tools::executable(command)
    }
}

fn command_line(task: &Task, binding: &Binding) -> Result<(String, Vec<String>)> {
    let scope = Scope::with_vars(binding.scope_vars());
    let command = task.binding_option("command", binding)?;
    if command.trim().is_empty() {
        return Err(Error::task(task.kind_name(), "no command configured"));
    }
    let args = match task.option("args")? {
        JsonValue::Array(items) => items
            .iter()
            .map(|item| Ok(Template::new(json_to_string(item))?.value(&scope)?))
            .collect::<Result<Vec<_>>>()?,
        other => vec![Template::new(json_to_string(other))?.value(&scope)?],
    };
    Ok((command, args))
}

impl TaskKind for ExecTask {
    fn name(&self) -> &str {
        "exec"
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.insert("command".into(), json!(""));
        options.insert("args".into(), json!([]));
        options
    }

    fn perform(&self, task: &Task) -> Result<Vec<Element>> {
        for binding in task.bindings() {
            let (command, args) = command_line(task, binding)?;
            let program = resolve_program(&command)?;
            tracing::info!("Executing {} {:?}", program.display(), args);

            let output = ChildCommand::new(program).args(args).run()?;
            if !output.success() {
                return Err(Error::task(
                    task.kind_name(),
                    format!(
                        "{} exited with {:?}: {}",
                        command,
                        output.exit_code,
                        output.stderr.trim()
                    ),
                ));
            }
        }
        Ok(task.default_output())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::task::kinds::testing::file_element;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_exec_templated_arguments() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "hello").unwrap();
        let target = dir.path().join("b.txt");

        let mut task = Task::new(Arc::new(ExecTask));
        task.set_option("command", json!("/bin/cp")).unwrap();
        task.set_option("args", json!(["{filePath}", "{target}"])).unwrap();
        task.add(file_element(&source), target.display().to_string());
        let outputs = task.output().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
        assert_eq!(outputs[0].path().unwrap().as_path(), target.as_path());
    }

    #[test]
    fn test_exec_failure_carries_stderr() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "").unwrap();

        let mut task = Task::new(Arc::new(ExecTask));
        task.set_option("command", json!("sh")).unwrap();
        task.set_option("args", json!(["-c", "echo broken >&2; exit 2"])).unwrap();
        task.add(file_element(&source), "");
        let err = task.output().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_exec_requires_command() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "").unwrap();
        let mut task = Task::new(Arc::new(ExecTask));
        task.add(file_element(&source), "");
        assert!(task.output().is_err());
    }
}
