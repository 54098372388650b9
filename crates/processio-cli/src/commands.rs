//! Subcommand handlers.
//!
//! Each handler calls exactly one engine operation and prints its result.
//! Caller identity and the admin check are enforced here, at the boundary.

use std::io::Read;

use anyhow::{Context, Result};
use processio_engine::VariableEngine;
use processio_store::{BulkRequest, Count, Variable, VariableQuery};
use thiserror::Error;
use tracing::info;

use crate::cli::{Commands, QueryArgs, ValueAction};
use crate::helpers::{parse_value, print_json};

/// Rejections made at the boundary before the engine is called.
#[derive(Debug, Error)]
pub enum CallerError {
    #[error("--user is required for this command")]
    MissingUser,

    #[error("{action} requires --admin")]
    NotAdmin { action: &'static str },
}

/// Who is calling.
pub struct Caller {
    pub user: String,
    pub admin: bool,
}

impl Caller {
    fn user(&self) -> Result<&str, CallerError> {
        if self.user.is_empty() {
            return Err(CallerError::MissingUser);
        }
        Ok(&self.user)
    }

    fn require_admin(&self, action: &'static str) -> Result<(), CallerError> {
        if !self.admin {
            return Err(CallerError::NotAdmin { action });
        }
        Ok(())
    }
}

pub async fn dispatch(engine: &VariableEngine, caller: &Caller, command: Commands) -> Result<()> {
    match command {
        Commands::Get { key } => {
            let variable = engine.get(caller.user()?, &key).await?;
            print_json(&variable)
        }
        Commands::Set {
            key,
            value,
            definition,
            instance,
        } => {
            let mut variable = Variable::new(key, parse_value(&value));
            if let Some(definition) = definition {
                variable = variable.with_process_definition(definition);
            }
            if let Some(instance) = instance {
                variable = variable.with_process_instance(instance);
            }
            engine.set(caller.user()?, variable).await?;
            Ok(())
        }
        Commands::Delete { key } => {
            engine.delete(caller.user()?, &key).await?;
            Ok(())
        }
        Commands::List(args) => {
            let query = build_query(&args)?;
            let variables = engine.list(caller.user()?, &query).await?;
            print_json(&variables)
        }
        Commands::Count(args) => {
            let query = build_query(&args)?;
            let count = engine.count(caller.user()?, &query).await?;
            print_json(&Count { count })
        }
        Commands::Bulk { file } => {
            let raw = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read bulk request from stdin")?;
                    buf
                }
            };
            let request: BulkRequest =
                serde_json::from_str(&raw).context("invalid bulk request")?;
            let response = engine.bulk(caller.user()?, request).await?;
            print_json(&response)
        }
        Commands::Value { action } => value(engine, caller, action).await,
        Commands::DeleteDefinition { definition_id } => {
            caller.require_admin("delete-definition")?;
            engine.delete_process_definition(&definition_id).await?;
            info!(definition_id = %definition_id, "definition variables removed");
            Ok(())
        }
        Commands::DeleteInstance { instance_id } => {
            caller.require_admin("delete-instance")?;
            engine.delete_process_instance(&instance_id).await?;
            info!(instance_id = %instance_id, "instance variables removed");
            Ok(())
        }
    }
}

async fn value(engine: &VariableEngine, caller: &Caller, action: ValueAction) -> Result<()> {
    let user = caller.user()?;
    match action {
        ValueAction::Get { key } => print_json(&engine.get_value(user, &key).await?),
        ValueAction::Set {
            key,
            value,
            definition,
            instance,
        } => {
            let value = parse_value(&value);
            match (definition, instance) {
                (Some(definition), Some(instance)) => {
                    engine
                        .set_instance_value(user, &definition, &instance, &key, value)
                        .await?
                }
                (Some(definition), None) => {
                    engine
                        .set_definition_value(user, &definition, &key, value)
                        .await?
                }
                (None, _) => engine.set_value(user, &key, value).await?,
            }
            Ok(())
        }
    }
}

fn build_query(args: &QueryArgs) -> Result<VariableQuery> {
    Ok(VariableQuery::from_pairs(args.pairs())?)
}
