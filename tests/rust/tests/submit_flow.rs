use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{post, put},
    Form, Json, Router,
};
use launcher::{connect, run_training_job, DRY_RUN_DIR_VAR};
use launcher_core::{Error, JobSpec, ParallelMode, Settings, SubmitConfig};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const JOB_ROUTE: &str = "/subscriptions/:sub/resourceGroups/:rg/providers/Microsoft.MachineLearningServices/workspaces/:ws/jobs/:name";

/// A captured job PUT
#[derive(Debug, Clone)]
struct Captured {
    workspace: String,
    name: String,
    authorization: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct MockState {
    captured: Arc<Mutex<Vec<Captured>>>,
    calls: Arc<AtomicU32>,
    token_requests: Arc<AtomicU32>,
    /// Respond 503 to this many requests before accepting
    transient_failures: Arc<AtomicU32>,
    /// Reject every job with 400
    reject: bool,
}

async fn put_job(
    State(state): State<MockState>,
    Path((_sub, _rg, ws, name)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.calls.fetch_add(1, Ordering::SeqCst);

    if state.reject {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": "UserError", "message": "compute not found"}})),
        );
    }

    let remaining = state.transient_failures.load(Ordering::SeqCst);
    if remaining > 0 {
        state.transient_failures.store(remaining - 1, Ordering::SeqCst);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"code": "ServiceUnavailable", "message": "busy"}})),
        );
    }

    state.captured.lock().unwrap().push(Captured {
        workspace: ws,
        name: name.clone(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        body,
    });

    (
        StatusCode::CREATED,
        Json(json!({
            "name": name,
            "properties": {
                "status": "NotStarted",
                "services": {
                    "Studio": {"endpoint": format!("https://ml.azure.com/runs/{}", name)}
                }
            }
        })),
    )
}

async fn issue_token(
    State(state): State<MockState>,
    Path(_tenant): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    if form.get("client_secret").map(String::as_str) != Some("secret") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid_client", "error_description": "bad secret"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"access_token": "mock-token", "expires_in": 3600, "token_type": "Bearer"})),
    )
}

// Start the mock management/token endpoint on a free port
async fn start_mock(state: MockState) -> Result<(String, tokio::sync::oneshot::Sender<()>)> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let port = portpicker::pick_unused_port().expect("No ports free");
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let router = Router::new()
        .route(JOB_ROUTE, put(put_job))
        .route("/:tenant/oauth2/v2.0/token", post(issue_token))
        .with_state(state);

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                rx.await.ok();
            })
            .await
            .ok();
    });

    Ok((format!("http://127.0.0.1:{}", port), tx))
}

fn settings(base_url: &str, mode: &str) -> Settings {
    Settings {
        subscription_id: "sub-1".to_string(),
        resource_group: "rg-1".to_string(),
        workspace: "ws-1".to_string(),
        compute_name: "gpu-cluster".to_string(),
        experiment: "ahmed".to_string(),
        parallel_mode: ParallelMode::from(mode),
        instance_count: 2,
        data_dir: "azureml://datastores/data/paths/ahmed".to_string(),
        output_dir: "azureml://datastores/out/paths/output".to_string(),
        ckpt_dir: "azureml://datastores/out/paths/ckpt".to_string(),
        aml_environment: "azureml:modulus:3".to_string(),
        hydra_epochs: Some(0),
        code: "azureml:aero-src:1".to_string(),
        submit: SubmitConfig {
            endpoint: base_url.to_string(),
            authority: base_url.to_string(),
            initial_retry_delay: Duration::from_millis(10),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn service_principal(key: &str) -> Option<String> {
    match key {
        "AZURE_TENANT_ID" => Some("tenant-1".to_string()),
        "AZURE_CLIENT_ID" => Some("client-1".to_string()),
        "AZURE_CLIENT_SECRET" => Some("secret".to_string()),
        _ => None,
    }
}

#[tokio::test]
async fn test_submit_pytorch_job() -> Result<()> {
    let state = MockState::default();
    let (base, _shutdown) = start_mock(state.clone()).await?;
    let settings = settings(&base, "pytorch");

    let submitter = connect(&settings, service_principal)?;
    let handle = run_training_job(&settings, submitter.as_ref()).await?;

    assert_eq!(handle.status, "NotStarted");
    assert_eq!(
        handle.studio_url.as_deref(),
        Some(format!("https://ml.azure.com/runs/{}", handle.name).as_str())
    );
    assert_eq!(state.token_requests.load(Ordering::SeqCst), 1);

    let captured = state.captured.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    let job = &captured[0];
    assert_eq!(job.workspace, "ws-1");
    assert_eq!(job.name, handle.name);
    assert_eq!(job.authorization.as_deref(), Some("Bearer mock-token"));

    let props = &job.body["properties"];
    assert_eq!(props["displayName"], "pytorch_2_ahmed])");
    assert_eq!(props["experimentName"], "ahmed_body_v2");
    assert_eq!(props["distribution"]["distributionType"], "PyTorch");
    assert_eq!(props["distribution"]["processCountPerInstance"], 4);
    assert_eq!(
        props["environmentVariables"]["MODULUS_DISTRIBUTED_INITIALIZATION_METHOD"],
        "ENV"
    );
    assert_eq!(props["environmentVariables"]["HYDRA_FULL_ERROR"], "1");
    assert_eq!(props["inputs"]["epochs"]["value"], "100");
    assert_eq!(props["inputs"]["checkpoint_save_freq"]["value"], "5");
    assert_eq!(props["tags"]["instance_count"], "2");
    assert_eq!(props["resources"]["instanceCount"], 2);
    assert!(props["environmentId"]
        .as_str()
        .unwrap()
        .ends_with("/workspaces/ws-1/environments/modulus/versions/3"));
    assert!(props["computeId"]
        .as_str()
        .unwrap()
        .ends_with("/workspaces/ws-1/computes/gpu-cluster"));
    assert!(props["codeId"]
        .as_str()
        .unwrap()
        .ends_with("/workspaces/ws-1/codes/aero-src/versions/1"));

    Ok(())
}

#[tokio::test]
async fn test_openmpi_job_with_static_token() -> Result<()> {
    let state = MockState::default();
    let (base, _shutdown) = start_mock(state.clone()).await?;
    let settings = settings(&base, "openmpi");

    let submitter = connect(&settings, |k| {
        (k == "AZURE_ACCESS_TOKEN").then(|| "static-token".to_string())
    })?;
    run_training_job(&settings, submitter.as_ref()).await?;

    assert_eq!(state.token_requests.load(Ordering::SeqCst), 0);
    let captured = state.captured.lock().unwrap().clone();
    let job = &captured[0];
    assert_eq!(job.authorization.as_deref(), Some("Bearer static-token"));

    let props = &job.body["properties"];
    assert_eq!(props["distribution"]["distributionType"], "Mpi");
    let env = &props["environmentVariables"];
    assert_eq!(env["OMPI_ALLOW_RUN_AS_ROOT"], "1");
    assert_eq!(env["OMPI_ALLOW_RUN_AS_ROOT_CONFIRM"], "1");
    assert_eq!(env["MODULUS_DISTRIBUTED_INITIALIZATION_METHOD"], "OPENMPI");
    assert_eq!(props["outputs"]["output_dir"]["assetName"], "ahmed_output");
    assert_eq!(props["outputs"]["checkpoint_dir"]["assetName"], "ahmed_output");

    Ok(())
}

#[tokio::test]
async fn test_unknown_mode_has_no_distribution() -> Result<()> {
    let state = MockState::default();
    let (base, _shutdown) = start_mock(state.clone()).await?;
    let settings = settings(&base, "horovod");

    let submitter = connect(&settings, service_principal)?;
    run_training_job(&settings, submitter.as_ref()).await?;

    let captured = state.captured.lock().unwrap().clone();
    let props = &captured[0].body["properties"];
    assert!(props.get("distribution").is_none());
    assert!(props["environmentVariables"]
        .get("MODULUS_DISTRIBUTED_INITIALIZATION_METHOD")
        .is_none());
    assert_eq!(props["tags"]["parallel_mode"], "horovod");

    Ok(())
}

#[tokio::test]
async fn test_transient_failures_are_retried() -> Result<()> {
    let state = MockState::default();
    state.transient_failures.store(2, Ordering::SeqCst);
    let (base, _shutdown) = start_mock(state.clone()).await?;
    let settings = settings(&base, "pytorch");

    let submitter = connect(&settings, service_principal)?;
    let handle = run_training_job(&settings, submitter.as_ref()).await?;

    assert_eq!(state.calls.load(Ordering::SeqCst), 3);
    assert_eq!(state.captured.lock().unwrap().len(), 1);
    // Token is cached across attempts
    assert_eq!(state.token_requests.load(Ordering::SeqCst), 1);
    assert!(handle.studio_url.is_some());

    Ok(())
}

#[tokio::test]
async fn test_retries_exhausted() -> Result<()> {
    let state = MockState::default();
    state.transient_failures.store(10, Ordering::SeqCst);
    let (base, _shutdown) = start_mock(state.clone()).await?;
    let settings = settings(&base, "pytorch");

    let submitter = connect(&settings, service_principal)?;
    let result = run_training_job(&settings, submitter.as_ref()).await;

    assert!(matches!(result, Err(Error::Api { status: 503, .. })));
    assert_eq!(state.calls.load(Ordering::SeqCst), 3);

    Ok(())
}

#[tokio::test]
async fn test_rejection_is_not_retried() -> Result<()> {
    let state = MockState {
        reject: true,
        ..Default::default()
    };
    let (base, _shutdown) = start_mock(state.clone()).await?;
    let settings = settings(&base, "pytorch");

    let submitter = connect(&settings, service_principal)?;
    let err = run_training_job(&settings, submitter.as_ref())
        .await
        .unwrap_err();

    match err {
        Error::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 400);
            assert_eq!(code, "UserError");
            assert_eq!(message, "compute not found");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(state.calls.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_bad_client_secret() -> Result<()> {
    let state = MockState::default();
    let (base, _shutdown) = start_mock(state.clone()).await?;
    let settings = settings(&base, "pytorch");

    let submitter = connect(&settings, |k| match k {
        "AZURE_CLIENT_SECRET" => Some("wrong".to_string()),
        other => service_principal(other),
    })?;
    let result = run_training_job(&settings, submitter.as_ref()).await;

    assert!(matches!(result, Err(Error::Auth { .. })));
    assert_eq!(state.calls.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn test_local_code_rejected_before_request() -> Result<()> {
    let state = MockState::default();
    let (base, _shutdown) = start_mock(state.clone()).await?;
    let mut settings = settings(&base, "pytorch");
    settings.code = ".".to_string();

    let submitter = connect(&settings, service_principal)?;
    let result = run_training_job(&settings, submitter.as_ref()).await;

    assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    assert_eq!(state.calls.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn test_dry_run_writes_job_file() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let dir = temp_dir.path().to_string_lossy().to_string();
    let settings = settings("http://unused.invalid", "openmpi");

    let submitter = connect(&settings, |k| (k == DRY_RUN_DIR_VAR).then(|| dir.clone()))?;
    let handle = run_training_job(&settings, submitter.as_ref()).await?;

    let path = temp_dir.path().join(format!("{}.json", handle.name));
    let job: JobSpec = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    assert_eq!(job.display_name, "openmpi_2_ahmed])");
    assert_eq!(job.distribution.map(|d| d.process_count_per_instance()), Some(4));
    assert_eq!(job.inputs["epochs"].integer_default(), Some(100));

    Ok(())
}
