use clap::{Args, Subcommand, ValueEnum};

pub mod delete;
pub mod export;
pub mod list;
pub mod set_password;

use common::crypto::KeyRole;
use common::key_store::{KeyPolicy, Storage};

use crate::op::Op;

crate::command_enum! {
    (SetPassword, set_password::SetPassword),
    (List, list::List),
    (Export, export::Export),
    (Delete, delete::Delete),
}

// Rename the generated Command to KeyCommand for clarity
pub type KeyCommand = Command;

/// Manage the keys held for tree paths
#[derive(Args, Debug, Clone)]
pub struct Key {
    #[command(subcommand)]
    pub command: KeyCommand,
}

#[async_trait::async_trait]
impl Op for Key {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArg {
    None,
    Once,
    Session,
    Persistent,
}

impl StorageArg {
    pub fn policy(self, prompt: bool) -> KeyPolicy {
        let store = match self {
            StorageArg::None => Storage::None,
            StorageArg::Once => Storage::Once,
            StorageArg::Session => Storage::Session,
            StorageArg::Persistent => Storage::Persistent,
        };
        KeyPolicy { store, prompt }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleArg {
    Sign,
    Decrypt,
}

impl From<RoleArg> for KeyRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Sign => KeyRole::Sign,
            RoleArg::Decrypt => KeyRole::Decrypt,
        }
    }
}
