use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::core::{
    Branch, LayoutConfig, Profile, SavedScenario, SimulationConfig, SimulationResult, TreeLayout,
    WorldlineCandidate, WorldlineReport, evaluate_worldlines, layout_tree, simulate,
};

#[derive(Parser, Debug)]
#[command(
    name = "worldline",
    about = "Monte Carlo life-plan explorer over combinations of uncertain life decisions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Evaluate every worldline of a request file and print the report as JSON.
    Plan {
        #[arg(long, help = "JSON file with `profile` and `branches`")]
        input: PathBuf,
        #[arg(long, help = "Monte Carlo trials per worldline, overrides the request")]
        trials: Option<u32>,
        #[arg(long, help = "Batch seed, overrides the request")]
        seed: Option<u64>,
        #[arg(long, help = "Write the best worldline as a saved scenario to this path")]
        save: Option<PathBuf>,
        #[arg(long, default_value = "best worldline", help = "Name of the saved scenario")]
        name: String,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WorldlinesPayload {
    profile: Profile,
    branches: Vec<Branch>,
    trials: Option<u32>,
    seed: Option<u64>,
    level_spacing: Option<f64>,
    leaf_spacing: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    profile: Profile,
    trials: Option<u32>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TreePayload {
    branches: Vec<Branch>,
    level_spacing: Option<f64>,
    leaf_spacing: Option<f64>,
}

#[derive(Debug)]
struct WorldlinesRequest {
    profile: Profile,
    branches: Vec<Branch>,
    config: SimulationConfig,
    layout: LayoutConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorldlinesResponse {
    baseline: SimulationResult,
    candidates: Vec<WorldlineCandidate>,
    clipped_count: u64,
    best_candidate_id: Option<String>,
    tree: TreeLayout,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/worldlines", post(worldlines_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/tree", post(tree_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "worldline HTTP API listening");

    axum::serve(listener, app).await
}

/// Runs `worldline plan`: evaluates the request file and prints the report.
pub fn run_plan(
    input: &Path,
    trials: Option<u32>,
    seed: Option<u64>,
    save: Option<&Path>,
    name: &str,
) -> Result<(), String> {
    let json = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read {}: {e}", input.display()))?;
    let mut payload = serde_json::from_str::<WorldlinesPayload>(&json)
        .map_err(|e| format!("Invalid request JSON in {}: {e}", input.display()))?;
    if trials.is_some() {
        payload.trials = trials;
    }
    if seed.is_some() {
        payload.seed = seed;
    }

    let request = worldlines_request_from_payload(payload)?;
    let (report, response) = run_worldlines(&request)?;
    let out = serde_json::to_string_pretty(&response)
        .map_err(|e| format!("Failed to serialize report: {e}"))?;
    println!("{out}");

    if let Some(path) = save {
        let scenario = best_scenario(&report, name)
            .ok_or_else(|| "No simulated worldline to save".to_string())?;
        save_scenario(path, &scenario)?;
        info!(path = %path.display(), candidate = %scenario.candidate_id, "scenario saved");
    }
    Ok(())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn worldlines_handler(Json(payload): Json<WorldlinesPayload>) -> Response {
    let request = match worldlines_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match run_worldlines(&request) {
        Ok((_, response)) => json_response(StatusCode::OK, response),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn simulate_handler(Json(payload): Json<SimulatePayload>) -> Response {
    let config = match simulation_config(payload.trials, payload.seed) {
        Ok(config) => config,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match simulate(&payload.profile, &config) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn tree_handler(Json(payload): Json<TreePayload>) -> Response {
    let layout = match layout_config(payload.level_spacing, payload.leaf_spacing) {
        Ok(layout) => layout,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match layout_tree(&payload.branches, layout) {
        Ok(tree) => json_response(StatusCode::OK, tree),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn worldlines_request_from_json(json: &str) -> Result<WorldlinesRequest, String> {
    let payload = serde_json::from_str::<WorldlinesPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    worldlines_request_from_payload(payload)
}

fn worldlines_request_from_payload(
    payload: WorldlinesPayload,
) -> Result<WorldlinesRequest, String> {
    Ok(WorldlinesRequest {
        config: simulation_config(payload.trials, payload.seed)?,
        layout: layout_config(payload.level_spacing, payload.leaf_spacing)?,
        profile: payload.profile,
        branches: payload.branches,
    })
}

fn simulation_config(trials: Option<u32>, seed: Option<u64>) -> Result<SimulationConfig, String> {
    let mut config = SimulationConfig::default();
    if let Some(v) = trials {
        if v == 0 {
            return Err("trials must be > 0".to_string());
        }
        config.trials = v;
    }
    if seed.is_some() {
        config.seed = seed;
    }
    Ok(config)
}

fn layout_config(
    level_spacing: Option<f64>,
    leaf_spacing: Option<f64>,
) -> Result<LayoutConfig, String> {
    let mut layout = LayoutConfig::default();
    if let Some(v) = level_spacing {
        if !v.is_finite() || v <= 0.0 {
            return Err("levelSpacing must be > 0".to_string());
        }
        layout.level_spacing = v;
    }
    if let Some(v) = leaf_spacing {
        if !v.is_finite() || v <= 0.0 {
            return Err("leafSpacing must be > 0".to_string());
        }
        layout.leaf_spacing = v;
    }
    Ok(layout)
}

fn run_worldlines(
    request: &WorldlinesRequest,
) -> Result<(WorldlineReport, WorldlinesResponse), String> {
    let mut tree = layout_tree(&request.branches, request.layout).map_err(|e| e.to_string())?;
    let report = evaluate_worldlines(
        &request.profile,
        &request.branches,
        &request.config,
        |done, total| debug!(done, total, "worldline progress"),
    )
    .map_err(|e| e.to_string())?;
    tree.overlay_scores(&report.candidates);
    let response = build_worldlines_response(&report, tree);
    Ok((report, response))
}

fn build_worldlines_response(report: &WorldlineReport, tree: TreeLayout) -> WorldlinesResponse {
    WorldlinesResponse {
        baseline: report.baseline.clone(),
        candidates: report.candidates.clone(),
        clipped_count: report.clipped_count,
        best_candidate_id: report.best().map(|c| c.id.clone()),
        tree,
    }
}

fn best_scenario(report: &WorldlineReport, name: &str) -> Option<SavedScenario> {
    let best = report.best()?;
    let profile = report.profiles.get(best.position)?;
    SavedScenario::promote(name, best, profile)
}

fn save_scenario(path: &Path, scenario: &SavedScenario) -> Result<(), String> {
    let json = serde_json::to_string_pretty(scenario)
        .map_err(|e| format!("Failed to serialize scenario: {e}"))?;
    fs::write(path, json).map_err(|e| format!("Failed to write {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Certainty, HouseholdMode, NodeKind};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    const HOME_REQUEST: &str = r#"{
        "profile": { "currentAge": 30, "targetRetireAge": 55, "household": "couple" },
        "branches": [
            {
                "id": "buy-home",
                "label": "buy a home",
                "certainty": "uncertain",
                "templates": ["housing_purchase"],
                "age": 38
            }
        ],
        "trials": 40,
        "seed": 11,
        "leafSpacing": 30
    }"#;

    #[test]
    fn worldlines_request_merges_overrides_onto_defaults() {
        let request = worldlines_request_from_json(HOME_REQUEST).expect("valid request");
        assert_eq!(request.profile.current_age, 30);
        assert_eq!(request.profile.target_retire_age, 55);
        assert_eq!(request.profile.household, HouseholdMode::Couple);
        assert_approx(request.profile.living_cost, Profile::default().living_cost);
        assert_eq!(request.branches.len(), 1);
        assert_eq!(request.branches[0].certainty, Certainty::Uncertain);
        assert_eq!(request.branches[0].age, Some(38));
        assert_eq!(request.config.trials, 40);
        assert_eq!(request.config.seed, Some(11));
        assert_approx(request.layout.leaf_spacing, 30.0);
        assert_approx(request.layout.level_spacing, LayoutConfig::default().level_spacing);
    }

    #[test]
    fn empty_request_uses_every_default() {
        let request = worldlines_request_from_json("{}").expect("valid request");
        assert_eq!(request.profile, Profile::default());
        assert!(request.branches.is_empty());
        assert_eq!(request.config, SimulationConfig::default());
    }

    #[test]
    fn request_rejects_zero_trials_and_bad_spacing() {
        let err = worldlines_request_from_json(r#"{ "trials": 0 }"#).expect_err("zero trials");
        assert!(err.contains("trials"));
        let err = worldlines_request_from_json(r#"{ "levelSpacing": -1 }"#).expect_err("spacing");
        assert!(err.contains("levelSpacing"));
    }

    #[test]
    fn worldlines_response_serialization_contains_expected_fields() {
        let request = worldlines_request_from_json(HOME_REQUEST).expect("valid request");
        let (report, response) = run_worldlines(&request).expect("valid plan");

        assert_eq!(response.candidates.len(), 2);
        assert_eq!(
            response.best_candidate_id,
            report.best().map(|c| c.id.clone())
        );
        let leaf_scores = response
            .tree
            .leaves()
            .map(|n| match n.kind {
                NodeKind::Leaf { score, .. } => score,
                _ => None,
            })
            .collect::<Vec<_>>();
        let candidate_scores = response.candidates.iter().map(|c| c.score).collect::<Vec<_>>();
        assert_eq!(leaf_scores, candidate_scores);

        let json = serde_json::to_string(&response).expect("response should serialize");
        assert!(json.contains("\"baseline\""));
        assert!(json.contains("\"clippedCount\""));
        assert!(json.contains("\"bestCandidateId\""));
        assert!(json.contains("\"yearlyData\""));
        assert!(json.contains("\"cashFlow\""));
        assert!(json.contains("\"tree\""));
    }

    #[test]
    fn unknown_template_is_reported_as_message() {
        let request = worldlines_request_from_json(
            r#"{ "branches": [
                { "id": "x", "label": "x", "certainty": "uncertain", "templates": ["lottery"] }
            ] }"#,
        )
        .expect("valid request");
        let err = run_worldlines(&request).expect_err("unknown template");
        assert!(err.contains("lottery"));
    }

    #[test]
    fn out_of_range_branch_age_is_rejected_as_message() {
        let request = worldlines_request_from_json(
            r#"{ "branches": [
                { "id": "kid", "label": "kid", "certainty": "uncertain",
                  "templates": ["new_child"], "age": 4294967295 }
            ] }"#,
        )
        .expect("valid request");
        let err = run_worldlines(&request).expect_err("age past horizon");
        assert!(err.contains("age"));
        assert!(err.contains("4294967295"));
    }

    #[test]
    fn plan_command_saves_best_scenario() {
        let dir = std::env::temp_dir().join(format!("worldline-plan-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        let input = dir.join("request.json");
        let output = dir.join("scenario.json");
        fs::write(&input, HOME_REQUEST).expect("write request");

        run_plan(&input, Some(20), Some(3), Some(&output), "keeper").expect("plan runs");

        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).expect("saved")).expect("json");
        assert_eq!(saved["name"], "keeper");
        assert_eq!(saved["result"]["trials"], 20);
        assert!(saved["candidateId"].as_str().is_some_and(|id| id.starts_with("wl:")));
        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[tokio::test]
    async fn handlers_map_errors_to_bad_request_without_caching() {
        let payload = SimulatePayload {
            profile: Profile {
                current_age: 100,
                ..Profile::default()
            },
            trials: Some(10),
            seed: Some(1),
        };
        let response = simulate_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );

        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tree_handler_lays_out_without_simulating() {
        let payload = TreePayload {
            branches: Vec::new(),
            level_spacing: None,
            leaf_spacing: None,
        };
        let response = tree_handler(Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
