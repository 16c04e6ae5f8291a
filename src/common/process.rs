use std::io::Read;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use log;

use crate::common::{self, Cancel, Error};

const POLL_INTERVAL : Duration = Duration::from_millis(100);
const STDERR_TAIL : usize = 20;

/// Captured output of a finished subprocess.
#[derive(Debug)]
pub struct Output {
    pub stdout : Vec<u8>,
}

fn drain<R : Read + Send + 'static>(pipe : Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

fn stderr_tail(stderr : &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines = text.lines().collect::<Vec<_>>();
    let start = lines.len().saturating_sub(STDERR_TAIL);
    lines[start..].join("\n")
}

/// Kills the child and everything it spawned. On unix the child leads its
/// own process group, so the whole group is signalled.
fn kill_tree(child : &mut process::Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let killed = process::Command::new("kill")
                .args(["-KILL", "--", &group])
                .stdin(process::Stdio::null())
                .stdout(process::Stdio::null())
                .stderr(process::Stdio::null())
                .status();
        if let Err(err) = killed {
            log::debug!("failed to signal process group {}: {}", group, err);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn program_name(proc : &process::Command) -> String {
    let program = std::path::Path::new(proc.get_program());
    program.file_stem().unwrap_or(proc.get_program()).to_string_lossy().into_owned()
}

/// Runs a command to completion, killing it if it outlives `timeout` or if
/// `cancel` is raised. A non-zero exit status is an error carrying the tail
/// of the process' stderr.
pub fn run(
    proc : &mut process::Command,
    timeout : Duration,
    cancel : &Cancel,
) -> common::Result<Output> {
    let program = program_name(proc);
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    log::debug!("running `{}` with args: {:?}", program, proc.get_args());
    proc.stdin(process::Stdio::null());
    proc.stdout(process::Stdio::piped());
    proc.stderr(process::Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        proc.process_group(0);
    }
    let mut child = proc.spawn()?;
    // both pipes are drained concurrently so a chatty child cannot block on a full pipe
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Ok(status);
        }
        if cancel.is_cancelled() {
            break Err(Error::Cancelled);
        }
        if Instant::now() >= deadline {
            log::error!("`{}` timed out after {:?}, killing", program, timeout);
            break Err(Error::Timeout { program : program.clone(), after : timeout });
        }
        thread::sleep(POLL_INTERVAL);
    };
    let status = match status {
        Ok(status) => status,
        Err(err) => {
            kill_tree(&mut child);
            // a survivor holding the pipes open would block a join, so the
            // drain threads are left to finish on their own
            drop(stdout);
            drop(stderr);
            return Err(err);
        },
    };
    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    if !status.success() {
        return Err(Error::Process {
            program,
            status : status.to_string(),
            stderr : stderr_tail(&stderr),
        });
    }
    Ok(Output { stdout })
}
