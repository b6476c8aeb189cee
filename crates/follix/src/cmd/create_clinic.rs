//! Create a clinic from the command line

use anyhow::{Context, Result, bail};
use clap::Args;
use follix_config::Config;
use follix_control::Clinic;
use follix_control::models::MAX_CLINIC_NAME_LEN;
use owo_colors::OwoColorize;
use tracing::info;

#[derive(Args, Debug)]
pub struct CreateClinicArgs {
    /// Display name of the clinic
    pub name: String,
}

pub async fn run(args: CreateClinicArgs, config: &Config) -> Result<()> {
    let name = args.name.trim();
    if name.is_empty() {
        bail!("clinic name must not be empty");
    }
    if name.chars().count() > MAX_CLINIC_NAME_LEN {
        bail!("clinic name must not exceed {} characters", MAX_CLINIC_NAME_LEN);
    }

    let store = super::open_store(config).await?;
    let clinic = Clinic::new(name);
    store.clinics().create(&clinic).await.context("failed to create clinic")?;
    info!(clinic_id = %clinic.id, "clinic created");

    println!("{} Clinic {} created", "✓".green(), clinic.name.cyan());
    println!("  Clinic ID  {}", clinic.id.to_string().bold());
    Ok(())
}
