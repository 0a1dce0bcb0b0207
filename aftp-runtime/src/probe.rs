//! Out-of-process capability probing.
//!
//! A runtime is checked by running a small generated program with the
//! runtime's own interpreter. The program tries to import each capability
//! and prints one JSON object on its last output line:
//! `{"<capability>": {"ok": true, "version": "1.2"}, ..}`.
//! Nothing is ever imported into this process.

use crate::catalog::{RuntimeCatalog, RuntimeSpec};
use crate::layout::RuntimeLayout;
use aftp_core::error::AftpError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Sentinel reported as missing when the runtime has no interpreter.
pub const NOT_MATERIALIZED: &str = "<not-materialized>";

/// Bumped whenever the probe program's output changes shape.
pub const PROBE_VERSION: u32 = 1;

/// Default bound on one probe subprocess
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Import result for one capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityStatus {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CapabilityStatus {
    pub fn available(version: Option<String>) -> Self {
        Self {
            ok: true,
            version: version.filter(|v| !v.is_empty()),
            error: None,
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            version: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of [`RuntimeProbe::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub ok: bool,
    pub missing: BTreeSet<String>,
}

/// Probed state of one runtime.
///
/// `ok == created && missing.is_empty()` always holds. When the runtime is
/// not created, `missing` is exactly `{NOT_MATERIALIZED}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeState {
    pub name: String,
    pub created: bool,
    pub ok: bool,
    pub missing: BTreeSet<String>,
    pub capabilities: BTreeMap<String, CapabilityStatus>,
}

impl RuntimeState {
    /// State of a runtime without an interpreter
    pub fn not_materialized(spec: &RuntimeSpec) -> Self {
        Self {
            name: spec.name.clone(),
            created: false,
            ok: false,
            missing: BTreeSet::from([NOT_MATERIALIZED.to_string()]),
            capabilities: spec
                .capabilities
                .iter()
                .map(|c| (c.clone(), CapabilityStatus::unavailable("runtime not materialized")))
                .collect(),
        }
    }

    /// State of a created runtime whose probe could not be run or read
    pub fn probe_failed(spec: &RuntimeSpec, reason: &str) -> Self {
        let capabilities: BTreeMap<_, _> = spec
            .capabilities
            .iter()
            .map(|c| {
                (
                    c.clone(),
                    CapabilityStatus::unavailable(format!("probe failed: {}", reason)),
                )
            })
            .collect();
        Self::from_capabilities(spec, capabilities)
    }

    /// State of a created runtime from a decoded probe report.
    ///
    /// Capabilities the report does not mention count as missing.
    pub fn from_report(spec: &RuntimeSpec, mut report: BTreeMap<String, CapabilityStatus>) -> Self {
        let capabilities: BTreeMap<_, _> = spec
            .capabilities
            .iter()
            .map(|c| {
                let status = report
                    .remove(c)
                    .unwrap_or_else(|| CapabilityStatus::unavailable("not reported by probe"));
                (c.clone(), status)
            })
            .collect();
        Self::from_capabilities(spec, capabilities)
    }

    fn from_capabilities(spec: &RuntimeSpec, capabilities: BTreeMap<String, CapabilityStatus>) -> Self {
        let missing: BTreeSet<String> = capabilities
            .iter()
            .filter(|(_, status)| !status.ok)
            .map(|(name, _)| name.clone())
            .collect();
        Self {
            name: spec.name.clone(),
            created: true,
            ok: missing.is_empty(),
            missing,
            capabilities,
        }
    }

    pub fn validation(&self) -> Validation {
        Validation {
            ok: self.ok,
            missing: self.missing.clone(),
        }
    }

    /// `created`, `missing`, or `missing: a, b`
    pub fn status_label(&self) -> String {
        if self.ok {
            "created".to_string()
        } else if !self.created {
            "missing".to_string()
        } else {
            let names: Vec<&str> = self.missing.iter().map(String::as_str).collect();
            format!("missing: {}", names.join(", "))
        }
    }
}

/// Uniform probe interface used by the registry.
#[async_trait]
pub trait CapabilityProbe: Send + Sync + Debug {
    /// Directory the runtime lives in
    fn runtime_dir(&self, name: &str) -> PathBuf;

    /// Whether the runtime exists on disk. Must not spawn anything.
    fn is_materialized(&self, name: &str) -> bool;

    /// Probe every capability of `spec`. Never fails; failures are folded
    /// into the returned state.
    async fn probe(&self, spec: &RuntimeSpec) -> RuntimeState;
}

/// Probes runtimes by running their own interpreter.
#[derive(Debug, Clone)]
pub struct RuntimeProbe {
    layout: RuntimeLayout,
    catalog: RuntimeCatalog,
    timeout: Duration,
}

impl RuntimeProbe {
    pub fn new(layout: RuntimeLayout, catalog: RuntimeCatalog) -> Self {
        Self {
            layout,
            catalog,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Bound each probe subprocess; a probe still running is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn layout(&self) -> &RuntimeLayout {
        &self.layout
    }

    pub fn catalog(&self) -> &RuntimeCatalog {
        &self.catalog
    }

    /// Catalog spec for `name`; unknown names have no capabilities.
    pub fn spec_for(&self, name: &str) -> RuntimeSpec {
        self.catalog
            .get(name)
            .cloned()
            .unwrap_or_else(|| RuntimeSpec::new(name))
    }

    pub fn is_materialized(&self, name: &str) -> bool {
        self.layout.is_materialized(name)
    }

    /// Whether every capability imports, and which do not.
    pub async fn validate(&self, name: &str) -> Validation {
        self.state(name).await.validation()
    }

    /// Per-capability detail for diagnostics.
    pub async fn details(&self, name: &str) -> BTreeMap<String, CapabilityStatus> {
        self.state(name).await.capabilities
    }

    /// Full probed state
    pub async fn state(&self, name: &str) -> RuntimeState {
        self.probe_spec(&self.spec_for(name)).await
    }

    async fn probe_spec(&self, spec: &RuntimeSpec) -> RuntimeState {
        if !self.layout.is_materialized(&spec.name) {
            return RuntimeState::not_materialized(spec);
        }
        if spec.capabilities.is_empty() {
            return RuntimeState::from_report(spec, BTreeMap::new());
        }

        match self.run_probe(spec).await {
            Ok(report) => RuntimeState::from_report(spec, report),
            Err(e) => {
                tracing::warn!("probe of runtime {} failed: {}", spec.name, e);
                RuntimeState::probe_failed(spec, &e.to_string())
            }
        }
    }

    async fn run_probe(
        &self,
        spec: &RuntimeSpec,
    ) -> Result<BTreeMap<String, CapabilityStatus>, AftpError> {
        let interpreter = self.layout.interpreter(&spec.name);
        let program = probe_program(&spec.capabilities)?;

        tracing::debug!(
            "probing runtime {} with {} ({} capabilities)",
            spec.name,
            interpreter.display(),
            spec.capabilities.len()
        );

        let child = Command::new(&interpreter)
            .arg("-c")
            .arg(program)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AftpError::probe(&spec.name, format!("cannot run {}: {}", interpreter.display(), e))
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| AftpError::probe(&spec.name, e.to_string()))?,
            Err(_) => {
                return Err(AftpError::probe(
                    &spec.name,
                    format!("timed out after {:?}", self.timeout),
                ))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(AftpError::probe(
                &spec.name,
                format!("{} {}", output.status, last.trim()).trim_end().to_string(),
            ));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| AftpError::probe(&spec.name, e))
    }
}

#[async_trait]
impl CapabilityProbe for RuntimeProbe {
    fn runtime_dir(&self, name: &str) -> PathBuf {
        self.layout.runtime_dir(name)
    }

    fn is_materialized(&self, name: &str) -> bool {
        self.layout.is_materialized(name)
    }

    async fn probe(&self, spec: &RuntimeSpec) -> RuntimeState {
        self.probe_spec(spec).await
    }
}

/// The program run inside the runtime.
pub fn probe_program(capabilities: &[String]) -> Result<String, AftpError> {
    // A JSON array of strings is also a valid Python list literal.
    let modules = serde_json::to_string(capabilities)?;
    Ok(format!(
        r#"# aftp capability probe v{version}
import importlib, json, sys
mods = {modules}
out = {{}}
for m in mods:
    try:
        mod = importlib.import_module(m)
        ver = getattr(mod, "__version__", None)
        if ver is None:
            ver = getattr(getattr(mod, "version", None), "__version__", None)
        out[m] = {{"ok": True, "version": str(ver) if ver else None}}
    except Exception as e:
        out[m] = {{"ok": False, "error": "%s: %s" % (type(e).__name__, e)}}
sys.stdout.write("\n" + json.dumps(out) + "\n")
sys.stdout.flush()
"#,
        version = PROBE_VERSION,
        modules = modules,
    ))
}

/// Decode the last non-empty line of the probe's standard output.
///
/// Imported modules may print to stdout, so earlier lines are ignored.
pub fn parse_probe_output(stdout: &str) -> Result<BTreeMap<String, CapabilityStatus>, String> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| "probe produced no output".to_string())?;

    let mut report: BTreeMap<String, CapabilityStatus> =
        serde_json::from_str(line).map_err(|e| format!("undecodable probe output: {}", e))?;
    for status in report.values_mut() {
        if status.version.as_deref() == Some("") {
            status.version = None;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> RuntimeSpec {
        RuntimeSpec::new("vision").with_capabilities(["cv2", "PIL"])
    }

    #[test]
    fn test_not_materialized_state() {
        let state = RuntimeState::not_materialized(&spec());
        assert!(!state.ok);
        assert!(!state.created);
        assert_eq!(state.missing, BTreeSet::from([NOT_MATERIALIZED.to_string()]));
        assert_eq!(state.status_label(), "missing");
        assert!(!state.capabilities["cv2"].ok);
    }

    #[test]
    fn test_report_with_unreported_capability() {
        let report = BTreeMap::from([(
            "cv2".to_string(),
            CapabilityStatus::available(Some("4.9.0".to_string())),
        )]);
        let state = RuntimeState::from_report(&spec(), report);
        assert!(state.created);
        assert!(!state.ok);
        assert_eq!(state.missing, BTreeSet::from(["PIL".to_string()]));
        assert_eq!(state.status_label(), "missing: PIL");
        assert_eq!(state.capabilities["cv2"].version.as_deref(), Some("4.9.0"));
    }

    #[test]
    fn test_probe_failure_marks_everything_missing() {
        let state = RuntimeState::probe_failed(&spec(), "exit status: 1");
        assert!(state.created);
        assert_eq!(state.missing.len(), 2);
        assert!(state.capabilities["PIL"]
            .error
            .as_deref()
            .unwrap()
            .contains("exit status: 1"));
    }

    #[test]
    fn test_parse_uses_last_line() {
        let stdout = "loading plugins...\n\n{\"cv2\":{\"ok\":true,\"version\":\"\"},\"PIL\":{\"ok\":false,\"error\":\"No module named 'PIL'\"}}\n";
        let report = parse_probe_output(stdout).unwrap();
        assert!(report["cv2"].ok);
        assert_eq!(report["cv2"].version, None);
        assert!(!report["PIL"].ok);

        assert!(parse_probe_output("").is_err());
        assert!(parse_probe_output("Traceback (most recent call last):").is_err());
    }

    #[test]
    fn test_probe_program_embeds_modules() {
        let program = probe_program(&["cv2".to_string(), "PIL".to_string()]).unwrap();
        assert!(program.contains(r#"mods = ["cv2","PIL"]"#));
        assert!(program.starts_with("# aftp capability probe v1"));
    }

    #[tokio::test]
    async fn test_missing_runtime_reports_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = RuntimeProbe::new(RuntimeLayout::new(tmp.path()), RuntimeCatalog::builtin().clone());

        let validation = probe.validate("image").await;
        assert!(!validation.ok);
        assert_eq!(validation.missing, BTreeSet::from([NOT_MATERIALIZED.to_string()]));

        let details = probe.details("image").await;
        assert_eq!(details.len(), 2);
        assert!(details.values().all(|s| !s.ok));
    }

    #[cfg(unix)]
    mod interpreter {
        use super::*;
        use crate::testing::{fake_runtime, SPAWN_LOCK};

        fn probe_for(root: &std::path::Path) -> RuntimeProbe {
            let catalog = RuntimeCatalog::new().with(spec());
            RuntimeProbe::new(RuntimeLayout::new(root), catalog)
                .with_timeout(Duration::from_millis(500))
        }

        #[tokio::test]
        async fn test_successful_probe() {
            let _guard = SPAWN_LOCK.lock().await;
            let tmp = tempfile::tempdir().unwrap();
            fake_runtime(
                tmp.path(),
                "vision",
                r#"echo 'noise from an import'
echo '{"cv2":{"ok":true,"version":"4.9.0"},"PIL":{"ok":true,"version":null}}'"#,
            );

            let probe = probe_for(tmp.path());
            assert!(probe.is_materialized("vision"));
            let validation = probe.validate("vision").await;
            assert!(validation.ok);
            assert!(validation.missing.is_empty());

            let details = probe.details("vision").await;
            assert_eq!(details["cv2"].version.as_deref(), Some("4.9.0"));
            assert_eq!(details["PIL"].version, None);
        }

        #[tokio::test]
        async fn test_partial_probe() {
            let _guard = SPAWN_LOCK.lock().await;
            let tmp = tempfile::tempdir().unwrap();
            fake_runtime(
                tmp.path(),
                "vision",
                r#"echo '{"cv2":{"ok":false,"error":"ImportError: libGL.so.1"},"PIL":{"ok":true}}'"#,
            );

            let state = probe_for(tmp.path()).state("vision").await;
            assert!(!state.ok);
            assert_eq!(state.status_label(), "missing: cv2");
            assert_eq!(
                state.capabilities["cv2"].error.as_deref(),
                Some("ImportError: libGL.so.1")
            );
        }

        #[tokio::test]
        async fn test_nonzero_exit_means_all_missing() {
            let _guard = SPAWN_LOCK.lock().await;
            let tmp = tempfile::tempdir().unwrap();
            fake_runtime(tmp.path(), "vision", "echo 'boom' >&2\nexit 3");

            let validation = probe_for(tmp.path()).validate("vision").await;
            assert!(!validation.ok);
            assert_eq!(
                validation.missing,
                BTreeSet::from(["PIL".to_string(), "cv2".to_string()])
            );
        }

        #[tokio::test]
        async fn test_undecodable_output_means_all_missing() {
            let _guard = SPAWN_LOCK.lock().await;
            let tmp = tempfile::tempdir().unwrap();
            fake_runtime(tmp.path(), "vision", "echo 'not json at all'");

            let validation = probe_for(tmp.path()).validate("vision").await;
            assert!(!validation.ok);
            assert_eq!(validation.missing.len(), 2);
        }

        #[tokio::test]
        async fn test_hung_probe_is_killed() {
            let _guard = SPAWN_LOCK.lock().await;
            let tmp = tempfile::tempdir().unwrap();
            fake_runtime(tmp.path(), "vision", "exec sleep 30");

            let started = std::time::Instant::now();
            let state = probe_for(tmp.path()).state("vision").await;
            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(state.created);
            assert!(!state.ok);
            assert!(state.capabilities["cv2"]
                .error
                .as_deref()
                .unwrap()
                .contains("timed out"));
        }
    }
}
