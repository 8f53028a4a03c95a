//! External geometry compiler invocation.
//!
//! The STL is produced by OpenSCAD from the rendered template. The compiler
//! is treated as an opaque command: `<program> -o <output> <input>`, judged
//! by its exit status only.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TowerError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_LINES: usize = 5;
/// How long to wait for stderr to close once the compiler has exited.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// Compiles a model source file into a printable model.
pub trait GeometryCompiler {
    /// Compile `input` into `output`, blocking until done.
    fn compile(&self, input: &Path, output: &Path) -> Result<()>;
}

/// OpenSCAD command-line compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenScad {
    /// Executable name or path.
    pub program: String,
    /// Kill the compiler if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl Default for OpenScad {
    fn default() -> Self {
        Self {
            program: "openscad".into(),
            timeout: None,
        }
    }
}

impl OpenScad {
    /// Compiler running `program` without a timeout.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let spawn_err = |source| TowerError::CompilerSpawn {
            program: self.program.clone(),
            source,
        };

        let Some(timeout) = self.timeout else {
            return child.wait().map_err(spawn_err);
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(spawn_err)? {
                return Ok(status);
            }
            if started.elapsed() >= timeout {
                // The child may exit between try_wait and kill
                let _ = child.kill();
                let _ = child.wait();
                return Err(TowerError::CompilerTimeout {
                    program: self.program.clone(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl GeometryCompiler for OpenScad {
    fn compile(&self, input: &Path, output: &Path) -> Result<()> {
        info!(
            program = %self.program,
            input = %input.display(),
            output = %output.display(),
            "Running geometry compiler"
        );

        let mut child = Command::new(&self.program)
            .arg("-o")
            .arg(output)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TowerError::CompilerSpawn {
                program: self.program.clone(),
                source,
            })?;

        // Drain stderr concurrently so a chatty compiler cannot block on a full pipe.
        // The reader is never joined: a wrapper script's grandchild can keep the
        // pipe open long after the compiler itself is gone.
        let (stderr_tx, stderr_rx) = mpsc::channel();
        if let Some(mut pipe) = child.stderr.take() {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                let _ = stderr_tx.send(buf);
            });
        }

        let started = Instant::now();
        let status = self.wait(&mut child)?;
        let stderr = stderr_rx.recv_timeout(STDERR_GRACE).unwrap_or_default();

        debug!(
            program = %self.program,
            elapsed_ms = started.elapsed().as_millis() as u64,
            code = ?status.code(),
            stderr = %stderr.trim_end(),
            "Geometry compiler finished"
        );

        if status.success() {
            Ok(())
        } else {
            Err(TowerError::ExternalToolFailure {
                program: self.program.clone(),
                code: status.code(),
                stderr: tail(&stderr, STDERR_TAIL_LINES),
            })
        }
    }
}

/// Last `n` non-empty lines of `text`, joined with `"; "`.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines[lines.len().saturating_sub(n)..].join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail() {
        assert_eq!(tail("", 3), "");
        assert_eq!(tail("a\n\nb\n", 3), "a; b");
        assert_eq!(tail("1\n2\n3\n4\n5\n6\n", 2), "5; 6");
    }

    #[test]
    fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = OpenScad::new("temptower-no-such-compiler-on-path");
        let err = compiler
            .compile(&dir.path().join("in.scad"), &dir.path().join("out.stl"))
            .unwrap_err();
        assert!(matches!(err, TowerError::CompilerSpawn { .. }));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-openscad");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_invocation_shape() {
            let dir = tempfile::tempdir().unwrap();
            // Copies input to output, asserting `-o <out> <in>` argument order
            let program = script(dir.path(), r#"[ "$1" = "-o" ] || exit 3; cp "$3" "$2""#);
            let input = dir.path().join("tower.openscad.txt");
            let output = dir.path().join("tower.stl");
            std::fs::write(&input, "cube(10);").unwrap();

            let compiler = OpenScad::new(program.to_string_lossy());
            compiler.compile(&input, &output).unwrap();
            assert_eq!(std::fs::read_to_string(&output).unwrap(), "cube(10);");
        }

        #[test]
        fn test_nonzero_exit() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "echo 'ERROR: Parser error' >&2; exit 1");
            let compiler = OpenScad::new(program.to_string_lossy());

            let err = compiler
                .compile(&dir.path().join("in"), &dir.path().join("out"))
                .unwrap_err();
            match err {
                TowerError::ExternalToolFailure { code, stderr, .. } => {
                    assert_eq!(code, Some(1));
                    assert_eq!(stderr, "ERROR: Parser error");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn test_timeout_kills_compiler() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "exec sleep 10");
            let compiler = OpenScad::new(program.to_string_lossy())
                .with_timeout(Some(Duration::from_millis(200)));

            let started = Instant::now();
            let err = compiler
                .compile(&dir.path().join("in"), &dir.path().join("out"))
                .unwrap_err();
            assert!(matches!(err, TowerError::CompilerTimeout { .. }));
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[test]
        fn test_timeout_with_wrapper_script() {
            let dir = tempfile::tempdir().unwrap();
            // No exec: the orphaned sleep keeps the stderr pipe open after sh is killed
            let program = script(dir.path(), "sleep 6");
            let compiler = OpenScad::new(program.to_string_lossy())
                .with_timeout(Some(Duration::from_millis(200)));

            let started = Instant::now();
            let err = compiler
                .compile(&dir.path().join("in"), &dir.path().join("out"))
                .unwrap_err();
            assert!(started.elapsed() < Duration::from_secs(2));
            assert!(err.to_string().ends_with("timed out after 200ms"));
            match err {
                TowerError::CompilerTimeout { timeout, .. } => {
                    assert_eq!(timeout, Duration::from_millis(200));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
