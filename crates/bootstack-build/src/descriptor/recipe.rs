//! Lowering a parsed descriptor into the fixed five-step build shape.
//!
//! The pipeline always runs base, dependency install, source copy,
//! identity, entry, in that order. Lowering maps descriptor instructions
//! onto those steps and rejects orderings the pipeline could not honour:
//!
//! - `FROM` comes first and only once.
//! - A `COPY` of one file directly followed by `RUN` copies the
//!   dependency manifest; those `RUN`s are the install commands.
//! - Every other `COPY` is a source copy. `RUN` anywhere else is an error.
//! - `WORKDIR` must precede every `COPY` and `RUN`.
//! - `ENV`, `LABEL`, `EXPOSE` are image metadata, applied on top of the
//!   base image's configuration.
//! - The last `USER` and the last `CMD`/`ENTRYPOINT` win.

use std::path::{Component, Path};

use bootstack_common::types::{EntryCommand, RuntimeIdentity};

use super::ast::{CommandForm, Descriptor, Instruction, Located};
use crate::error::{BuildError, Result};

/// Image metadata set by the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigDirective {
    /// `ENV key=value`
    Env(String, String),
    /// `WORKDIR path`
    Workdir(String),
    /// `LABEL key=value`
    Label(String, String),
    /// `EXPOSE port`
    Expose(String),
}

/// The manifest copy and the commands that install from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStep {
    /// Manifest path relative to the build context.
    pub manifest: String,
    /// Destination inside the image.
    pub dest: String,
    /// Install commands, in order.
    pub commands: Vec<CommandForm>,
}

/// One `COPY` of application sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyStep {
    /// Sources relative to the build context.
    pub sources: Vec<String>,
    /// Destination inside the image.
    pub dest: String,
}

/// A descriptor lowered onto the build stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecipe {
    /// Base image reference or source URI.
    pub base: String,
    /// Metadata applied after the base configuration is inherited.
    pub directives: Vec<ConfigDirective>,
    /// Dependency install step, if the descriptor has one.
    pub dependencies: Option<DependencyStep>,
    /// Source copies, in order.
    pub sources: Vec<CopyStep>,
    /// Identity from `USER`; the configured default applies when absent.
    pub identity: Option<RuntimeIdentity>,
    /// The entry command.
    pub entry: EntryCommand,
}

impl BuildRecipe {
    /// Lowers a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Descriptor`] naming the offending line.
    pub fn from_descriptor(descriptor: &Descriptor) -> Result<Self> {
        let mut iter = descriptor.instructions.iter().peekable();
        let base = match iter.next() {
            Some(Located {
                instruction: Instruction::From { image },
                ..
            }) => image.clone(),
            Some(other) => {
                return Err(BuildError::descriptor(
                    other.line,
                    format!("expected FROM first, found {}", other.instruction.keyword()),
                ));
            }
            None => return Err(BuildError::descriptor(0, "descriptor contains no instructions")),
        };

        let mut recipe = Lowering::default();
        while let Some(located) = iter.next() {
            let next_is_run = matches!(
                iter.peek(),
                Some(Located {
                    instruction: Instruction::Run(_),
                    ..
                })
            );
            recipe.lower(located, next_is_run)?;
        }

        let last_line = descriptor.instructions.last().map_or(0, |l| l.line);
        let entry = recipe.entry(last_line)?;
        Ok(Self {
            base,
            directives: recipe.directives,
            dependencies: recipe.dependencies,
            sources: recipe.sources,
            identity: recipe.identity,
            entry,
        })
    }
}

#[derive(Default)]
struct Lowering {
    directives: Vec<ConfigDirective>,
    dependencies: Option<DependencyStep>,
    sources: Vec<CopyStep>,
    identity: Option<RuntimeIdentity>,
    cmd: Option<CommandForm>,
    entrypoint: Option<CommandForm>,
    in_dependency_block: bool,
    file_step_seen: bool,
}

impl Lowering {
    fn lower(&mut self, located: &Located, next_is_run: bool) -> Result<()> {
        let line = located.line;
        if !matches!(located.instruction, Instruction::Run(_)) {
            self.in_dependency_block = false;
        }
        match &located.instruction {
            Instruction::From { .. } => {
                return Err(BuildError::descriptor(line, "multi-stage builds are not supported"));
            }
            Instruction::Copy { sources, dest } => {
                for source in sources {
                    check_context_path(line, source)?;
                }
                self.file_step_seen = true;
                if next_is_run && sources.len() == 1 && names_a_file(&sources[0]) {
                    self.lower_manifest_copy(line, &sources[0], dest)?;
                } else {
                    self.sources.push(CopyStep {
                        sources: sources.clone(),
                        dest: dest.clone(),
                    });
                }
            }
            Instruction::Run(command) => match &mut self.dependencies {
                Some(step) if self.in_dependency_block => step.commands.push(command.clone()),
                _ => {
                    return Err(BuildError::descriptor(
                        line,
                        "RUN is only supported directly after copying the dependency manifest",
                    ));
                }
            },
            Instruction::Workdir(path) => {
                if self.file_step_seen {
                    return Err(BuildError::descriptor(line, "WORKDIR must precede COPY and RUN"));
                }
                self.directives.push(ConfigDirective::Workdir(path.clone()));
            }
            Instruction::Env(pairs) => self.directives.extend(
                pairs
                    .iter()
                    .map(|(k, v)| ConfigDirective::Env(k.clone(), v.clone())),
            ),
            Instruction::Label(pairs) => self.directives.extend(
                pairs
                    .iter()
                    .map(|(k, v)| ConfigDirective::Label(k.clone(), v.clone())),
            ),
            Instruction::Expose(ports) => self
                .directives
                .extend(ports.iter().cloned().map(ConfigDirective::Expose)),
            Instruction::User(spec) => {
                let identity = RuntimeIdentity::parse(spec)
                    .map_err(|e| BuildError::descriptor(line, format!("USER {spec}: {e}")))?;
                self.identity = Some(identity);
            }
            Instruction::Cmd(form) => self.cmd = Some(form.clone()),
            Instruction::Entrypoint(form) => self.entrypoint = Some(form.clone()),
        }
        Ok(())
    }

    fn lower_manifest_copy(&mut self, line: usize, manifest: &str, dest: &str) -> Result<()> {
        if self.dependencies.is_some() {
            return Err(BuildError::descriptor(line, "only one dependency install step is supported"));
        }
        if !self.sources.is_empty() {
            return Err(BuildError::descriptor(
                line,
                "dependency install must come before source copies",
            ));
        }
        self.dependencies = Some(DependencyStep {
            manifest: manifest.to_string(),
            dest: dest.to_string(),
            commands: Vec::new(),
        });
        self.in_dependency_block = true;
        Ok(())
    }

    /// `ENTRYPOINT` argv followed by `CMD` argv. A shell-form entrypoint
    /// ignores `CMD`.
    fn entry(&self, line: usize) -> Result<EntryCommand> {
        let argv = match (&self.entrypoint, &self.cmd) {
            (Some(shell @ CommandForm::Shell(_)), _) => shell.to_argv(),
            (Some(CommandForm::Exec(entrypoint)), cmd) => {
                let mut argv = entrypoint.clone();
                argv.extend(cmd.iter().flat_map(CommandForm::to_argv));
                argv
            }
            (None, Some(cmd)) => cmd.to_argv(),
            (None, None) => {
                return Err(BuildError::descriptor(line, "descriptor declares no CMD or ENTRYPOINT"));
            }
        };
        EntryCommand::new(argv).map_err(|e| BuildError::descriptor(line, e.to_string()))
    }
}

/// Whether a source can only be a single file: not the context root, no
/// trailing slash, no wildcard.
fn names_a_file(source: &str) -> bool {
    !matches!(source, "." | "./") && !source.ends_with('/') && !source.contains('*')
}

fn check_context_path(line: usize, source: &str) -> Result<()> {
    let escapes = Path::new(source)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(BuildError::descriptor(
            line,
            format!("COPY source {source:?} is outside the build context"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse;

    fn lower(text: &str) -> Result<BuildRecipe> {
        BuildRecipe::from_descriptor(&parse(text)?)
    }

    #[test]
    fn typical_descriptor_maps_onto_stages() {
        let recipe = lower(
            "FROM python:3.11-slim\nWORKDIR /app\nCOPY requirements.txt .\n\
             RUN pip install --upgrade pip\nRUN pip install --no-cache-dir -r requirements.txt\n\
             COPY . .\nENV PYTHONUNBUFFERED=1\nUSER 1000\nCMD [\"python\", \"main.py\"]",
        )
        .expect("lower");

        assert_eq!(recipe.base, "python:3.11-slim");
        let deps = recipe.dependencies.expect("dependency step");
        assert_eq!(deps.manifest, "requirements.txt");
        assert_eq!(deps.dest, ".");
        assert_eq!(deps.commands.len(), 2);
        assert_eq!(recipe.sources, vec![CopyStep {
            sources: vec![".".into()],
            dest: ".".into(),
        }]);
        assert_eq!(recipe.identity, Some(RuntimeIdentity { uid: 1000, gid: 1000 }));
        assert_eq!(recipe.entry.argv(), ["python", "main.py"]);
        assert_eq!(recipe.directives, vec![
            ConfigDirective::Workdir("/app".into()),
            ConfigDirective::Env("PYTHONUNBUFFERED".into(), "1".into()),
        ]);
    }

    #[test]
    fn entrypoint_and_cmd_concatenate() {
        let recipe = lower("FROM a\nENTRYPOINT [\"python\"]\nCMD [\"main.py\"]").expect("lower");
        assert_eq!(recipe.entry.argv(), ["python", "main.py"]);

        let recipe = lower("FROM a\nENTRYPOINT python app.py\nCMD [\"ignored\"]").expect("lower");
        assert_eq!(recipe.entry.argv(), ["/bin/sh", "-c", "python app.py"]);
    }

    #[test]
    fn last_cmd_wins_and_shell_form_uses_sh() {
        let recipe = lower("FROM a\nCMD [\"first\"]\nCMD python main.py").expect("lower");
        assert_eq!(recipe.entry.argv(), ["/bin/sh", "-c", "python main.py"]);
    }

    #[test]
    fn missing_entry_is_rejected() {
        let err = lower("FROM a\nCOPY . .").expect_err("no entry");
        assert!(err.to_string().contains("no CMD or ENTRYPOINT"));
        assert!(lower("FROM a\nCMD []").is_err());
    }

    #[test]
    fn root_user_is_rejected() {
        let err = lower("FROM a\nUSER 0\nCMD x").expect_err("root");
        assert!(matches!(err, BuildError::Descriptor { line: 2, .. }));
        assert!(lower("FROM a\nUSER appuser\nCMD x").is_err());
    }

    #[test]
    fn ordering_violations_are_rejected() {
        assert!(lower("WORKDIR /app\nFROM a\nCMD x").is_err());
        assert!(lower("FROM a\nFROM b\nCMD x").is_err());
        assert!(lower("FROM a\nRUN echo hi\nCMD x").is_err());
        assert!(lower("FROM a\nCOPY . .\nRUN make\nCMD x").is_err());
        assert!(lower("FROM a\nCOPY . .\nWORKDIR /app\nCMD x").is_err());
        assert!(lower("FROM a\nCOPY src /src\nCOPY req.txt .\nRUN pip\nCMD x").is_err());
    }

    #[test]
    fn dependency_block_ends_at_first_non_run_instruction() {
        let err = lower("FROM a\nCOPY requirements.txt .\nRUN one\nENV X=1\nRUN two\nCMD x")
            .expect_err("run after env");
        assert!(matches!(err, BuildError::Descriptor { line: 5, .. }));

        let recipe = lower("FROM a\nCOPY requirements.txt .\nRUN one\nRUN two\nENV X=1\nCMD x")
            .expect("lower");
        assert_eq!(recipe.dependencies.expect("dependency step").commands.len(), 2);
    }

    #[test]
    fn copy_sources_must_stay_in_context() {
        assert!(lower("FROM a\nCOPY ../secret /s\nCMD x").is_err());
        assert!(lower("FROM a\nCOPY /etc/passwd /p\nCMD x").is_err());
    }

    #[test]
    fn manifest_copy_without_run_is_a_source_copy() {
        let recipe = lower("FROM a\nCOPY requirements.txt .\nCMD x").expect("lower");
        assert!(recipe.dependencies.is_none());
        assert_eq!(recipe.sources.len(), 1);
    }
}
