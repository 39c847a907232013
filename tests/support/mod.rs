use smokepack::fakes::{FakeBuilder, FakeCheck, FakeRuntime};
use smokepack::{BuilderIdentity, BuildpackDescriptor, SmokeConfig, Toolchain};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Build output containing the Procfile buildpack banner
#[allow(dead_code)]
pub const PROCFILE_BUILD_LOGS: &str = "\
===> ANALYZING
===> DETECTING
paketo-buildpacks/procfile 5.6.0
===> BUILDING

Paketo Buildpack for Procfile 5.6.0
  https://github.com/paketo-buildpacks/procfile
  Process types:
    amd64-process: python3 -m http.server \"$PORT\"
    web:           python3 -m http.server \"$PORT\"
===> EXPORTING
Successfully built image";

#[allow(dead_code)]
pub fn smokepack_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.join("smokepack")
}

/// A fixtures root holding a minimal `procfile` application
#[allow(dead_code)]
pub fn procfile_fixtures() -> TempDir {
    let dir = TempDir::new().expect("create fixtures dir");
    let app = dir.path().join("procfile");
    fs::create_dir_all(&app).expect("create procfile fixture");
    fs::write(app.join("Procfile"), "web: python3 -m http.server \"$PORT\"\n")
        .expect("write Procfile");
    fs::write(app.join("index.html"), "<p>fixture</p>\n").expect("write index.html");
    dir
}

/// Test configuration with short readiness timings
#[allow(dead_code)]
pub fn test_config(fixtures: &Path) -> Arc<SmokeConfig> {
    let descriptor =
        BuildpackDescriptor::from_json(r#"{"procfile": "some/procfile-buildpack"}"#).unwrap();
    let config = SmokeConfig::new(BuilderIdentity::new("test-builder").unwrap(), descriptor)
        .with_fixtures_dir(fixtures)
        .with_readiness_timeout(Duration::from_millis(300))
        .with_poll_interval(Duration::from_millis(10));
    Arc::new(config)
}

#[allow(dead_code)]
pub fn toolchain(
    builder: &Arc<FakeBuilder>,
    runtime: &Arc<FakeRuntime>,
    check: &Arc<FakeCheck>,
) -> Toolchain {
    Toolchain::new(builder.clone(), runtime.clone(), check.clone())
}
