// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::sync::Arc;

use triageflow_rs::triageflow::graphs::{checkpointer_for, TriageWorkflow, WorkflowDeps};
use triageflow_rs::triageflow::server;
use triageflow_rs::triageflow::workflow::config::WorkflowConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the triage HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
    /// Run one conversation through the workflow and print the final state
    Run {
        /// Nurse/patient conversation text
        #[arg(short, long)]
        conversation: String,

        /// Patient identifier to look up
        #[arg(short, long)]
        patient_id: Option<String>,

        /// Thread to checkpoint under
        #[arg(short, long)]
        thread_id: Option<String>,

        /// Known patient condition; selects the patient-specific workflow
        #[arg(long = "condition")]
        conditions: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = WorkflowConfig::from_env()?;
    log::debug!(
        "Memory {:?}, max steps {}, extractor {:?}, triage {:?}",
        config.memory_type,
        config.max_steps,
        config.extractor,
        config.triage
    );

    match args.command {
        Commands::Serve { port } => {
            let workflow = Arc::new(TriageWorkflow::from_config(&config)?);
            server::serve(port, workflow).await?;
        }
        Commands::Run {
            conversation,
            patient_id,
            thread_id,
            conditions,
        } => {
            let workflow = if conditions.is_empty() {
                TriageWorkflow::from_config(&config)?
            } else {
                log::info!("Using patient-specific workflow for {:?}", conditions);
                TriageWorkflow::for_patient(
                    &WorkflowDeps::from_config(&config)?,
                    &conditions,
                    checkpointer_for(&config),
                    config.execution(),
                )?
            };

            let input = TriageWorkflow::initial_input(&conversation, patient_id.as_deref());
            let state = workflow.run(input, thread_id.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&state.to_json())?);
        }
    }

    Ok(())
}
