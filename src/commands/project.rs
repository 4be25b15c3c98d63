//! Project command - register projects under a tenant.

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};

use crate::services::Services;
use crate::store::DocumentStore;
use crate::types::Project;

#[derive(Args)]
pub struct ProjectCmd {
    #[command(subcommand)]
    pub command: ProjectSubCmd,
}

#[derive(Subcommand)]
pub enum ProjectSubCmd {
    /// Create a project or rename it
    Add {
        /// Project id
        id: String,

        /// Owning tenant
        #[arg(long, short = 't')]
        tenant: String,

        /// Display name (defaults to the id)
        #[arg(long)]
        name: Option<String>,
    },
}

impl ProjectCmd {
    pub async fn run(&self) -> Result<()> {
        let services = Services::open().await?;

        match &self.command {
            ProjectSubCmd::Add { id, tenant, name } => {
                if services.store.get_tenant(tenant).await?.is_none() {
                    bail!("Tenant not found: {}. Run `errstack tenant add {}` first.", tenant, tenant);
                }

                let existing = services.store.get_project(id).await?;
                if let Some(other) = existing.filter(|p| p.tenant_id != *tenant) {
                    bail!("Project {} already belongs to tenant {}", id, other.tenant_id);
                }

                let project = Project {
                    id: id.clone(),
                    tenant_id: tenant.clone(),
                    name: name.clone().unwrap_or_else(|| id.clone()),
                };
                services
                    .store
                    .upsert_project(&project)
                    .await
                    .context("Failed to save project")?;

                println!("Project {} saved under tenant {}.", project.id, project.tenant_id);
            }
        }

        Ok(())
    }
}
