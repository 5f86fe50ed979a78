use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::TempDir;

// Each test binary uses a different subset of these helpers.
#[allow(dead_code)]
pub struct TestContext {
    pub _temp_dir: TempDir,
    pub work_dir: PathBuf,
    pub tools_dir: PathBuf,
    pub bin_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let work_dir = temp_dir.path().join("work");
        let tools_dir = temp_dir.path().join("tools");
        fs::create_dir_all(&work_dir).expect("Failed to create work dir");
        fs::create_dir_all(&tools_dir).expect("Failed to create tools dir");

        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_debrel"));

        Self {
            _temp_dir: temp_dir,
            work_dir,
            tools_dir,
            bin_path,
        }
    }

    /// Command isolated from the user's config, running in the work directory.
    pub fn cmd(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.bin_path);
        self.isolate(cmd.env_remove("RUST_LOG"));
        cmd.current_dir(&self.work_dir);
        cmd
    }

    /// Async variant for tests that serve HTTP from the same runtime.
    pub fn async_cmd(&self, api_url: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.bin_path);
        cmd.env_remove("RUST_LOG")
            .env("DEBREL_CONFIG", self._temp_dir.path().join("config.json"))
            .env("XDG_CONFIG_HOME", self._temp_dir.path().join("config"))
            .env("DEBREL_API_URL", api_url)
            .env("DEBREL_REPO", "owner/pkg")
            .env("DEBREL_ASSET", "pkg.deb")
            .env("DEBREL_PACKAGE", "pkg")
            .env("DEBREL_HTTP_TIMEOUT", "10")
            .env("DEBREL_QUERY_TOOL", self.tools_dir.join("dpkg-query"))
            .env("DEBREL_INSTALL_TOOL", self.tools_dir.join("dpkg"))
            .env("DEBREL_ESCALATION_TOOL", self.tools_dir.join("sudo"))
            .current_dir(&self.work_dir)
            .kill_on_drop(true);
        cmd
    }

    fn isolate<'a>(&self, cmd: &'a mut std::process::Command) -> &'a mut std::process::Command {
        cmd.env("DEBREL_CONFIG", self._temp_dir.path().join("config.json"))
            .env("XDG_CONFIG_HOME", self._temp_dir.path().join("config"))
    }

    /// Writes an executable shell script into the tools directory.
    pub fn write_tool(&self, name: &str, body: &str) -> PathBuf {
        let path = self.tools_dir.join(name);
        write_script(&path, body);
        path
    }
}

pub fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_code(&self, code: i32) -> &Self {
        if self.status.code() != Some(code) {
            panic!(
                "Expected exit code {} but got {:?}\nstdout: {}\nstderr: {}",
                code,
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_success(&self) -> &Self {
        self.assert_code(0)
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
