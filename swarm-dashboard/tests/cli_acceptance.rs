use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Output, Stdio};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    swarm_dir: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");
        let swarm_dir = base.join("swarm");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        seed_agent_fixture(&swarm_dir, "builder", "session.jsonl");
        seed_agent_fixture(&swarm_dir, "scout", "working.jsonl");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
            swarm_dir,
        }
    }

    fn default_config_path(&self) -> PathBuf {
        self.xdg_config.join("swarm-dashboard/config.toml")
    }

    /// Write a config with three agents: one finished, one long silent, one not started.
    fn write_config(&self, path: &Path, extra: &str) {
        let content = format!(
            r#"
[swarm]
name = "Acceptance Swarm"
swarm_dir = "{swarm}"
task_dir = "{swarm}/tasks"
{extra}
[[agents]]
id = "builder"
role = "Implementer"
wave = 1

[[agents]]
id = "scout"
role = "Researcher"
wave = 1

[[agents]]
id = "reviewer"
role = "Reviewer"
wave = 2
"#,
            swarm = self.swarm_dir.display(),
            extra = extra,
        );
        fs::create_dir_all(path.parent().expect("config path has a parent"))
            .expect("failed to create config dir");
        fs::write(path, content).expect("failed to write config");
    }
}

fn seed_agent_fixture(swarm_dir: &Path, agent: &str, fixture: &str) {
    let source = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../swarm-dashboard-core/tests/fixtures/agent-logs")
        .join(fixture);
    let target = swarm_dir.join(agent).join("output.jsonl");

    fs::create_dir_all(target.parent().expect("missing fixture parent"))
        .expect("failed to create agent directory");
    fs::copy(source, target).expect("failed to copy agent log fixture");
}

fn command(env: &CliTestEnv, args: &[&str]) -> Command {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("swarm-status"));

    let mut cmd = Command::new(bin_path);
    cmd.args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG");
    cmd
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    command(env, args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute swarm-status: {e}"))
}

/// Start a long-running `--watch` process with stdout captured.
fn spawn_watch(env: &CliTestEnv, args: &[&str]) -> Child {
    command(env, args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap_or_else(|e| panic!("failed to spawn swarm-status: {e}"))
}

fn stop(mut child: Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "swarm-status {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn json_summary_classifies_every_agent() {
    let env = CliTestEnv::new();
    env.write_config(&env.default_config_path(), "");

    let output = run_bin(&env, &["--json"]);
    assert_success(&["--json"], &output);

    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");

    assert_eq!(summary["swarm_name"], "Acceptance Swarm");
    assert_eq!(summary["total_agents"], 3);
    assert_eq!(summary["agents"]["builder"]["status"], "completed");
    assert_eq!(summary["agents"]["builder"]["completion"], "marker");
    assert_eq!(summary["agents"]["builder"]["malformed_lines"], 1);
    // Last event was long ago and too few events to presume completion
    assert_eq!(summary["agents"]["scout"]["status"], "stale");
    assert_eq!(summary["agents"]["reviewer"]["status"], "pending");
    assert_eq!(summary["overall_progress"], 33);

    let log_dir = env.xdg_state.join("swarm-dashboard");
    assert!(log_dir.exists(), "log directory should be created");
}

#[test]
fn table_output_lists_agents_by_wave() {
    let env = CliTestEnv::new();
    env.write_config(&env.default_config_path(), "");

    let output = run_bin(&env, &[]);
    assert_success(&[], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Swarm: Acceptance Swarm"));
    assert!(stdout.contains("Progress: 33% (1/3 completed)"));
    assert!(stdout.contains("builder"));
    assert!(stdout.contains("reviewer"));

    let builder_row = stdout
        .lines()
        .find(|line| line.contains("builder"))
        .expect("builder row missing");
    assert!(builder_row.contains("completed"), "got row: {builder_row}");
}

#[test]
fn single_agent_detail_from_explicit_config() {
    let env = CliTestEnv::new();
    let config_path = env.home.join("custom.toml");
    env.write_config(&config_path, "");

    let args = ["--config", config_path.to_str().unwrap(), "--agent", "builder"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Agent:       builder"));
    assert!(stdout.contains("Status:      completed"));
    assert!(stdout.contains("Files touched (2):"));
    assert!(stdout.contains("Edit"));
}

#[test]
fn unknown_agent_fails() {
    let env = CliTestEnv::new();
    env.write_config(&env.default_config_path(), "");

    let output = run_bin(&env, &["--agent", "ghost"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("agent not found: ghost"), "got stderr: {stderr}");
}

#[test]
fn invalid_thresholds_are_rejected() {
    let env = CliTestEnv::new();
    env.write_config(
        &env.default_config_path(),
        "\n[thresholds]\nactive_secs = 120\nidle_secs = 60\n",
    );

    let output = run_bin(&env, &["--json"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load configuration"), "got stderr: {stderr}");
}

#[test]
fn watch_banner_reports_effective_interval() {
    let env = CliTestEnv::new();
    env.write_config(&env.default_config_path(), "");

    let mut child = spawn_watch(&env, &["--watch", "--interval", "10"]);
    let stdout = child.stdout.take().expect("stdout is piped");
    let mut banner = String::new();
    BufReader::new(stdout)
        .read_line(&mut banner)
        .expect("failed to read banner");
    stop(child);

    assert!(banner.contains("poll every 100ms"), "got banner: {banner}");
}

#[test]
fn watch_mode_picks_up_agents_added_to_config() {
    let env = CliTestEnv::new();
    let config_path = env.default_config_path();
    env.write_config(&config_path, "");

    let mut child = spawn_watch(&env, &["--watch", "--json", "--interval", "100"]);
    let stdout = child.stdout.take().expect("stdout is piped");
    let mut polls = serde_json::Deserializer::from_reader(stdout).into_iter::<serde_json::Value>();

    let first = polls
        .next()
        .expect("watch produced no output")
        .expect("poll output should be JSON");
    assert_eq!(first["total_agents"], 3);

    env.write_config(&config_path, "\n[[agents]]\nid = \"late\"\nwave = 3\n");

    let mut grown = None;
    for poll in polls.by_ref().take(100) {
        let summary = poll.expect("poll output should be JSON");
        if summary["total_agents"] == 4 {
            grown = Some(summary);
            break;
        }
    }
    stop(child);

    let summary = grown.expect("new agent never appeared");
    assert_eq!(summary["agents"]["late"]["status"], "pending");
    assert_eq!(summary["agents"]["builder"]["status"], "completed");
}
