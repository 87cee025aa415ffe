//! Build descriptor parser built on `nom`.
//!
//! Reads Dockerfile-syntax text into a [`Descriptor`] and lowers it into a
//! [`BuildRecipe`](recipe::BuildRecipe) shaped for the stage pipeline.
//! Only single-stage descriptors are accepted; instructions that would need
//! features outside this tool (`ADD`, `ARG`, `VOLUME`, `HEALTHCHECK`, ...)
//! are rejected with their line number.

pub mod ast;
pub mod lexer;
pub mod recipe;

use std::path::Path;

use bootstack_common::error::BootstackError;

use self::ast::{CommandForm, Descriptor, Instruction, Located};
use crate::error::{BuildError, Result};

/// Parses descriptor text.
///
/// # Errors
///
/// Returns [`BuildError::Descriptor`] for unknown or unsupported
/// instructions, malformed arguments, or a descriptor with no instructions.
pub fn parse(content: &str) -> Result<Descriptor> {
    let mut instructions = Vec::new();
    for logical in lexer::logical_lines(content) {
        let instruction = parse_instruction(&logical.text)
            .map_err(|message| BuildError::descriptor(logical.line, message))?;
        instructions.push(Located {
            line: logical.line,
            instruction,
        });
    }
    if instructions.is_empty() {
        return Err(BuildError::descriptor(0, "descriptor contains no instructions"));
    }
    tracing::debug!(count = instructions.len(), "descriptor parsed");
    Ok(Descriptor { instructions })
}

/// Reads and parses a descriptor file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or a parse error.
pub fn parse_file(path: &Path) -> Result<Descriptor> {
    let content = std::fs::read_to_string(path).map_err(|e| BootstackError::io(path, e))?;
    parse(&content)
}

fn parse_instruction(text: &str) -> std::result::Result<Instruction, String> {
    let (_, (keyword, args)) =
        lexer::instruction_head(text).map_err(|_| format!("cannot read instruction {text:?}"))?;
    let keyword = keyword.to_ascii_uppercase();
    let args = args.trim();

    let needs_args = |what: &str| {
        if args.is_empty() {
            Err(format!("{keyword} requires {what}"))
        } else {
            Ok(())
        }
    };

    match keyword.as_str() {
        "FROM" => {
            needs_args("an image")?;
            let parts = split_words(args)?;
            match parts.as_slice() {
                [image] => Ok(Instruction::From {
                    image: image.clone(),
                }),
                [image, as_kw, _alias] if as_kw.eq_ignore_ascii_case("as") => {
                    Ok(Instruction::From {
                        image: image.clone(),
                    })
                }
                _ => Err(format!("FROM takes one image, got {args:?}")),
            }
        }
        "RUN" => {
            needs_args("a command")?;
            Ok(Instruction::Run(command_form(args)))
        }
        "COPY" => {
            needs_args("sources and a destination")?;
            parse_copy(args)
        }
        "WORKDIR" => {
            needs_args("a path")?;
            Ok(Instruction::Workdir(args.to_string()))
        }
        "ENV" => {
            needs_args("key=value pairs")?;
            Ok(Instruction::Env(pairs(args, &keyword)?))
        }
        "LABEL" => {
            needs_args("key=value pairs")?;
            Ok(Instruction::Label(pairs(args, &keyword)?))
        }
        "EXPOSE" => {
            needs_args("a port")?;
            Ok(Instruction::Expose(split_words(args)?))
        }
        "USER" => {
            needs_args("a user")?;
            Ok(Instruction::User(args.to_string()))
        }
        "CMD" => {
            needs_args("a command")?;
            Ok(Instruction::Cmd(command_form(args)))
        }
        "ENTRYPOINT" => {
            needs_args("a command")?;
            Ok(Instruction::Entrypoint(command_form(args)))
        }
        "ADD" | "ARG" | "VOLUME" | "SHELL" | "STOPSIGNAL" | "HEALTHCHECK" | "ONBUILD"
        | "MAINTAINER" => Err(format!("{keyword} is not supported")),
        _ => Err(format!("unknown instruction {keyword}")),
    }
}

/// JSON arrays are exec form; anything else (including invalid JSON) is
/// shell form.
fn command_form(args: &str) -> CommandForm {
    if args.starts_with('[') {
        if let Ok(argv) = serde_json::from_str::<Vec<String>>(args) {
            return CommandForm::Exec(argv);
        }
    }
    CommandForm::Shell(args.to_string())
}

fn split_words(args: &str) -> std::result::Result<Vec<String>, String> {
    lexer::words(args)
        .map(|(_, w)| w)
        .map_err(|_| format!("cannot split arguments {args:?}"))
}

fn pairs(args: &str, keyword: &str) -> std::result::Result<Vec<(String, String)>, String> {
    if let Ok((_, pairs)) = lexer::key_value_pairs(args) {
        return Ok(pairs);
    }
    // Legacy single-pair form: `ENV KEY value with spaces`.
    match args.split_once(char::is_whitespace) {
        Some((key, value)) if !key.contains('=') => {
            Ok(vec![(key.to_string(), value.trim().to_string())])
        }
        _ => Err(format!("{keyword} expects key=value pairs, got {args:?}")),
    }
}

fn parse_copy(args: &str) -> std::result::Result<Instruction, String> {
    let mut parts = if args.starts_with('[') {
        serde_json::from_str::<Vec<String>>(args).map_err(|e| format!("COPY array: {e}"))?
    } else {
        split_words(args)?
    };
    if let Some(flag) = parts.iter().find(|p| p.starts_with("--")) {
        return Err(format!("COPY flag {flag} is not supported"));
    }
    let Some(dest) = parts.pop() else {
        return Err("COPY requires sources and a destination".into());
    };
    if parts.is_empty() {
        return Err("COPY requires at least one source".into());
    }
    Ok(Instruction::Copy {
        sources: parts,
        dest,
    })
}
