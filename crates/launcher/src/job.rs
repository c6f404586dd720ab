//! Job specification assembly
//!
//! Everything here is pure: settings in, job specification out. Submission
//! lives in [`crate::run`].

use std::collections::BTreeMap;

use launcher_core::{
    Distribution, EnvironmentVariables, Identity, InputMode, Inputs, JobInput, JobOutput, JobSpec,
    OutputMode, Outputs, ParallelMode, Settings, TagValue, Tags,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Experiment every run is filed under
pub const EXPERIMENT_NAME: &str = "ahmed_body_v2";

/// Value of the `experiment_type` tag
pub const EXPERIMENT_TYPE: &str = "training";

/// Asset name given to both output folders
pub const OUTPUT_ASSET_NAME: &str = "ahmed_output";

/// Worker processes launched on each node
pub const PROCESSES_PER_INSTANCE: u32 = 4;

pub const DEFAULT_EPOCHS: u32 = 100;
pub const DEFAULT_CHECKPOINT_SAVE_FREQ: u32 = 5;

const TRAIN_SCRIPT: &str = "examples/cfd/aero_graph_net/train.py";

pub const INIT_METHOD_VAR: &str = "MODULUS_DISTRIBUTED_INITIALIZATION_METHOD";

/// Merge user tags with the run's fixed metadata; fixed keys win.
pub fn build_tags(settings: &Settings) -> Tags {
    let mut tags = settings.tags.clone().unwrap_or_default();
    tags.insert("experiment_name".to_string(), EXPERIMENT_NAME.into());
    tags.insert("experiment_type".to_string(), EXPERIMENT_TYPE.into());
    tags.insert(
        "parallel_mode".to_string(),
        settings.parallel_mode.as_str().into(),
    );
    tags.insert(
        "instance_count".to_string(),
        TagValue::from(settings.instance_count),
    );
    tags.insert(
        "experiment".to_string(),
        settings.experiment.as_str().into(),
    );
    tags
}

/// Display name shown in the studio, `{mode}_{instances}_{experiment}])`.
///
/// The trailing `])` is kept verbatim.
pub fn build_name(settings: &Settings) -> String {
    format!(
        "{}_{}_{}])",
        settings.parallel_mode, settings.instance_count, settings.experiment
    )
}

/// Zero counts as unset.
fn or_default(value: Option<u32>, default: u32) -> i64 {
    i64::from(value.filter(|v| *v != 0).unwrap_or(default))
}

/// Data folder plus the two scalar hyperparameters.
pub fn create_inputs(settings: &Settings) -> Inputs {
    let mut inputs = BTreeMap::new();
    inputs.insert(
        "data_dir".to_string(),
        JobInput::UriFolder {
            path: settings.data_dir.clone(),
            mode: InputMode::ReadOnlyMount,
        },
    );
    inputs.insert(
        "epochs".to_string(),
        JobInput::Integer {
            default: or_default(settings.hydra_epochs, DEFAULT_EPOCHS),
        },
    );
    inputs.insert(
        "checkpoint_save_freq".to_string(),
        JobInput::Integer {
            default: or_default(
                settings.hydra_checkpoint_save_freq,
                DEFAULT_CHECKPOINT_SAVE_FREQ,
            ),
        },
    );
    inputs
}

/// Output and checkpoint folders.
///
/// Both carry the same asset name; if the platform deduplicates by name one
/// of them is dropped. Left as is until the intended naming is confirmed.
pub fn create_outputs(settings: &Settings) -> Outputs {
    let folder = |path: &str| JobOutput {
        path: path.to_string(),
        mode: OutputMode::ReadWriteMount,
        name: Some(OUTPUT_ASSET_NAME.to_string()),
    };

    let mut outputs = BTreeMap::new();
    outputs.insert("output_dir".to_string(), folder(&settings.output_dir));
    outputs.insert("checkpoint_dir".to_string(), folder(&settings.ckpt_dir));
    outputs
}

/// Training command; `${{...}}` placeholders are filled in by the platform.
pub fn training_command(experiment: &str) -> String {
    format!(
        "python {} +experiment={} output=${{{{outputs.checkpoint_dir}}}} data.data_dir=${{{{inputs.data_dir}}}}",
        TRAIN_SCRIPT, experiment
    )
}

/// Attach the distribution descriptor and launcher variables for a mode.
pub fn apply_parallel_mode(
    mode: &ParallelMode,
    env: &mut EnvironmentVariables,
) -> Option<Distribution> {
    match mode {
        ParallelMode::OpenMpi => {
            env.insert("OMPI_ALLOW_RUN_AS_ROOT".to_string(), "1".to_string());
            env.insert("OMPI_ALLOW_RUN_AS_ROOT_CONFIRM".to_string(), "1".to_string());
            env.insert(INIT_METHOD_VAR.to_string(), "OPENMPI".to_string());
            Some(Distribution::Mpi {
                process_count_per_instance: PROCESSES_PER_INSTANCE,
            })
        }
        ParallelMode::PyTorch => {
            env.insert(INIT_METHOD_VAR.to_string(), "ENV".to_string());
            Some(Distribution::PyTorch {
                process_count_per_instance: PROCESSES_PER_INSTANCE,
            })
        }
        ParallelMode::Other(mode) => {
            warn!(%mode, "Unknown parallel mode, submitting without distribution");
            None
        }
    }
}

/// Assemble the complete job specification.
pub fn build_job(settings: &Settings) -> JobSpec {
    let mut environment_variables = BTreeMap::new();
    environment_variables.insert("HYDRA_FULL_ERROR".to_string(), "1".to_string());
    let distribution = apply_parallel_mode(&settings.parallel_mode, &mut environment_variables);

    let job = JobSpec {
        name: Uuid::new_v4().simple().to_string(),
        display_name: build_name(settings),
        experiment_name: EXPERIMENT_NAME.to_string(),
        code: settings.code.clone(),
        command: training_command(&settings.experiment),
        environment: settings.aml_environment.clone(),
        identity: Identity::User,
        tags: build_tags(settings),
        inputs: create_inputs(settings),
        outputs: create_outputs(settings),
        environment_variables,
        instance_count: settings.instance_count,
        shm_size: settings.shm_size.clone(),
        compute: settings.compute_name.clone(),
        distribution,
    };

    debug!(
        job = %job.name,
        display_name = %job.display_name,
        distribution = ?job.distribution,
        "Assembled job specification"
    );
    job
}
