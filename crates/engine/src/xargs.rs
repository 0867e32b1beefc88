//! Length-bounded command partitioning and concurrent execution
//!
//! A simplified `xargs`: a command prefix plus a list of filenames is split into
//! batches that each fit the platform command-line limit, and the batches run on
//! a bounded pool. Output is concatenated in batch order regardless of which
//! batch finishes first.

use crate::classify::parse_shebang;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use lintel_core::platform;
use rayon::prelude::*;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Seed for the argument shuffle; fixed so runs are reproducible
pub const FIXED_RANDOM_SEED: u64 = 1_542_676_187;

/// Smallest batch size worth splitting into
const MIN_BATCH_ARGS: usize = 4;

/// Exit code and combined stdout/stderr of a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub code: i32,
    pub output: Vec<u8>,
}

impl RunOutput {
    /// A failure carrying a message instead of process output
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            output: message.into().into_bytes(),
        }
    }
}

/// One command invocation: the fixed prefix plus a contiguous run of arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    pub prefix: &'a [String],
    pub args: &'a [String],
}

impl Batch<'_> {
    /// Serialized length of the full command
    pub fn command_length(&self) -> usize {
        let parts: Vec<&str> = self
            .prefix
            .iter()
            .chain(self.args)
            .map(String::as_str)
            .collect();
        platform::command_length(&parts)
    }
}

/// Execution options for [`xargs`]
#[derive(Debug, Clone)]
pub struct XargsOptions {
    /// Treat exit code 0 as failure and anything else as success
    pub negate: bool,
    /// Desired number of batches running at once
    pub target_concurrency: usize,
    /// Command-line budget; defaults to the platform limit for `env`
    pub max_length: Option<usize>,
    /// Variables set on top of the inherited environment
    pub env: IndexMap<String, String>,
    /// Working directory of the spawned processes
    pub cwd: Option<PathBuf>,
    /// Shuffle the arguments with this seed before partitioning
    pub shuffle_seed: Option<u64>,
}

impl Default for XargsOptions {
    fn default() -> Self {
        Self {
            negate: false,
            target_concurrency: 1,
            max_length: None,
            env: IndexMap::new(),
            cwd: None,
            shuffle_seed: None,
        }
    }
}

impl XargsOptions {
    fn path_var(&self) -> Option<OsString> {
        self.env
            .get("PATH")
            .map(OsString::from)
            .or_else(|| std::env::var_os("PATH"))
    }

    fn working_dir(&self) -> PathBuf {
        self.cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn platform_max_length(&self) -> usize {
        let mut environ: IndexMap<String, String> = std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect();
        environ.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        platform::max_command_length(environ.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

/// Deterministically shuffle `args`
pub fn shuffled(args: &[String], seed: u64) -> Vec<String> {
    let mut args = args.to_vec();
    fastrand::Rng::with_seed(seed).shuffle(&mut args);
    args
}

/// Split `args` into batches that fit `max_length` when appended to `cmd`
///
/// Batches hold at most `max(4, ceil(len / target_concurrency))` arguments so
/// the work spreads over roughly `target_concurrency` processes. With no
/// arguments a single argument-less batch is returned.
pub fn partition<'a>(
    cmd: &'a [String],
    args: &'a [String],
    target_concurrency: usize,
    max_length: usize,
) -> Result<Vec<Batch<'a>>> {
    let max_args = MIN_BATCH_ARGS.max(args.len().div_ceil(target_concurrency.max(1)));
    let base = platform::command_length(cmd) + 1;
    let too_long = |arg: &String| Error::ArgumentTooLong {
        arg: arg.clone(),
        max_length,
    };

    let mut batches = Vec::new();
    let mut start = 0;
    let mut total = base;
    for (i, arg) in args.iter().enumerate() {
        let arg_length = platform::command_length(std::slice::from_ref(arg)) + 1;
        if total + arg_length <= max_length && i - start < max_args {
            total += arg_length;
            continue;
        }
        if i == start {
            return Err(too_long(arg));
        }
        batches.push(Batch {
            prefix: cmd,
            args: &args[start..i],
        });
        start = i;
        total = base + arg_length;
        if total > max_length {
            return Err(too_long(arg));
        }
    }
    batches.push(Batch {
        prefix: cmd,
        args: &args[start..],
    });
    Ok(batches)
}

fn not_found(exe: &str, reason: &str) -> Error {
    Error::ExecutableNotFound {
        exe: exe.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable_file(_path: &Path) -> bool {
    true
}

/// Resolve an executable name against `PATH`, or validate an explicit path
pub fn normexe(exe: &str, path_var: Option<&OsString>, cwd: &Path) -> Result<String> {
    let has_separator = exe.contains('/') || exe.contains(std::path::MAIN_SEPARATOR);
    if !has_separator {
        return which::which_in(exe, path_var, cwd)
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(|_| not_found(exe, "not found"));
    }

    let path = cwd.join(exe);
    if path.is_dir() {
        Err(not_found(exe, "is a directory"))
    } else if !path.is_file() {
        Err(not_found(exe, "not found"))
    } else if !is_executable_file(&path) {
        Err(not_found(exe, "is not executable"))
    } else {
        Ok(exe.to_string())
    }
}

/// Resolve the executable and expand its shebang into the command
///
/// Makes deep-path and `env`-style shebangs work even where the OS does not
/// interpret them.
pub fn normalize_cmd(cmd: &[String], path_var: Option<&OsString>, cwd: &Path) -> Result<Vec<String>> {
    let Some((first, rest)) = cmd.split_first() else {
        return Err(not_found("", "not found"));
    };
    let exe = normexe(first, path_var, cwd)?;

    let shebang = parse_shebang(&cwd.join(&exe)).ok().flatten().unwrap_or_default();
    let mut normalized: Vec<String> = shebang;
    normalized.push(exe);
    normalized.extend(rest.iter().cloned());

    normalized[0] = normexe(&normalized[0], path_var, cwd)?;
    Ok(normalized)
}

#[tracing::instrument(skip_all, fields(program = %batch.prefix.first().map_or("", String::as_str), args = batch.args.len()))]
fn run_batch(batch: &Batch<'_>, cwd: &Path, env: &IndexMap<String, String>) -> RunOutput {
    let Some((program, prefix_args)) = batch.prefix.split_first() else {
        return RunOutput::failure("empty command");
    };

    let mut expr = duct::cmd(program, prefix_args.iter().chain(batch.args))
        .dir(cwd)
        .stdin_null()
        .stderr_to_stdout()
        .stdout_capture()
        .unchecked();
    for (key, value) in env {
        expr = expr.env(key, value);
    }

    match expr.run() {
        // A signal-terminated child has no code
        Ok(output) => RunOutput {
            code: output.status.code().unwrap_or(1),
            output: output.stdout,
        },
        Err(e) => RunOutput::failure(format!("Failed to run `{program}`: {e}\n")),
    }
}

/// Run `cmd` over `args` in length-bounded batches
///
/// The exit code is the maximum over batches (after negation), so any failing
/// batch fails the whole run. An unresolvable executable yields a failed
/// result without spawning anything.
#[tracing::instrument(skip(args, opts), fields(args = args.len(), concurrency = opts.target_concurrency))]
pub fn xargs(cmd: &[String], args: &[String], opts: &XargsOptions) -> Result<RunOutput> {
    let cwd = opts.working_dir();
    let path_var = opts.path_var();

    let cmd = match normalize_cmd(cmd, path_var.as_ref(), &cwd) {
        Ok(cmd) => cmd,
        Err(e @ Error::ExecutableNotFound { .. }) => {
            tracing::debug!("{e}");
            return Ok(RunOutput::failure(format!("{e}\n")));
        }
        Err(e) => return Err(e),
    };

    let args = match opts.shuffle_seed {
        Some(seed) => shuffled(args, seed),
        None => args.to_vec(),
    };
    let max_length = opts
        .max_length
        .unwrap_or_else(|| opts.platform_max_length());
    let batches = partition(&cmd, &args, opts.target_concurrency, max_length)?;

    let threads = opts.target_concurrency.clamp(1, batches.len());
    tracing::debug!(batches = batches.len(), threads, max_length, "partitioned");

    let results: Vec<RunOutput> = if threads == 1 {
        batches
            .iter()
            .map(|b| run_batch(b, &cwd, &opts.env))
            .collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        // Indexed collect keeps submission order
        pool.install(|| {
            batches
                .par_iter()
                .map(|b| run_batch(b, &cwd, &opts.env))
                .collect()
        })
    };

    let mut aggregate = RunOutput::default();
    for result in results {
        let code = if opts.negate {
            i32::from(result.code == 0)
        } else {
            result.code
        };
        aggregate.code = aggregate.code.max(code);
        aggregate.output.extend_from_slice(&result.output);
    }
    Ok(aggregate)
}

/// Number of batches to aim for when a hook allows parallelism
///
/// `LINTEL_NO_CONCURRENCY` forces serial execution.
pub fn target_concurrency(require_serial: bool) -> usize {
    if require_serial || std::env::var_os("LINTEL_NO_CONCURRENCY").is_some() {
        1
    } else {
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}
