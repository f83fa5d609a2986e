//! Preprocessing and artifact-hash derivation.
//!
//! A request is preprocessed once per cache miss. The normalized output is
//! scanned line by line to extract inline option directives and to fold the
//! semantically relevant content into a running hash; the final option
//! string is then rewritten by the architecture-override and pointer-width
//! policies. The resulting [`ArtifactHash`] names the compiled file in the
//! cache directory, so two requests that preprocess identically under the
//! same options and toolchain share one artifact regardless of which source
//! file they came from.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use cuforge_common::Hash64;
use cuforge_toolchain::{CommandRunner, ToolchainInfo};

use crate::cache::CacheSettings;
use crate::error::CompileError;
use crate::request::CompileRequest;

/// Defines-injection file, regenerated for every preprocessed request.
pub const DEFINE_FILE: &str = "defines.inl";

/// Scratch file receiving preprocessor output, overwritten per request.
pub const PREPROCESSED_FILE: &str = "preprocessed.cu";

/// Log file capturing preprocessor stderr.
pub const PREPROCESS_LOG: &str = "preprocess.log";

/// Log file capturing compiler stderr.
pub const COMPILE_LOG: &str = "compile.log";

/// Extension of compiled artifact files.
pub const ARTIFACT_EXT: &str = "cubin";

/// Comment marker that injects compiler flags from kernel source.
///
/// A preprocessed line of the form `// EMIT_NVCC_OPTIONS <flags>` appends
/// `<flags>` to the final option string, letting kernel code request the
/// flags it needs (discovered only after preprocessing resolves `#if`s).
pub const INLINE_OPTION_MARKER: &str = "// EMIT_NVCC_OPTIONS ";

/// Binary-format flag used when no override is configured.
const DEFAULT_BINARY_FORMAT: &str = "-cubin";

/// Tens-encoded toolchain release from which the pointer width must be
/// passed explicitly (CUDA 3.2).
const EXPLICIT_POINTER_WIDTH_RELEASE: u32 = 32;

/// Persistent cache key: the content-sensitive hash computed after
/// preprocessing. Also the stem of the artifact's filename.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ArtifactHash(Hash64);

impl ArtifactHash {
    pub(crate) fn new(hash: Hash64) -> Self {
        Self(hash)
    }

    /// The underlying hash value.
    pub fn hash(self) -> Hash64 {
        self.0
    }

    /// The artifact's filename within the cache directory.
    pub fn file_name(self) -> String {
        format!("{}.{ARTIFACT_EXT}", self.0)
    }
}

impl fmt::Display for ArtifactHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of the preprocessing stage.
#[derive(Debug)]
pub struct PreprocessOutcome {
    /// The content-sensitive artifact hash.
    pub artifact_hash: ArtifactHash,
    /// The fully rewritten option string for the compile run.
    pub final_options: String,
    /// Where the artifact lives (or will live) in the cache directory.
    pub artifact_path: PathBuf,
}

/// Writes the defines-injection file for a request: one `#define` line per
/// mapping entry (in sorted name order), then the static preamble, then the
/// request preamble, each followed by a newline.
pub fn write_define_file(
    cache_dir: &Path,
    request: &CompileRequest,
    static_preamble: &str,
) -> Result<PathBuf, CompileError> {
    let path = cache_dir.join(DEFINE_FILE);

    let mut content = String::new();
    let mut names: Vec<&String> = request.defines().keys().collect();
    names.sort();
    for name in names {
        content.push_str("#define ");
        content.push_str(name);
        content.push(' ');
        content.push_str(&request.defines()[name]);
        content.push('\n');
    }
    content.push_str(static_preamble);
    content.push('\n');
    content.push_str(request.preamble());
    content.push('\n');

    std::fs::write(&path, content).map_err(|e| CompileError::Io {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(path)
}

/// Runs the external preprocessor over a request and derives the artifact
/// hash, the final option string, and the artifact path.
///
/// `detected_arch` is the device generation reported by the embedding
/// runtime, used by the architecture-override policy when neither the
/// request nor the settings force one.
pub fn run_preprocessor(
    request: &CompileRequest,
    toolchain: &ToolchainInfo,
    cache_dir: &Path,
    settings: &CacheSettings,
    detected_arch: Option<u32>,
    runner: &dyn CommandRunner,
) -> Result<PreprocessOutcome, CompileError> {
    let preprocessed = cache_dir.join(PREPROCESSED_FILE);
    let log_file = cache_dir.join(PREPROCESS_LOG);

    let mut final_options = String::new();
    if !settings.options.is_empty() {
        final_options.push_str(&settings.options);
    }
    push_option(&mut final_options, request.options());

    let mut spec = toolchain.base_command();
    spec.arg("-E")
        .arg("-o")
        .arg(preprocessed.clone())
        .arg("-include")
        .arg(cache_dir.join(DEFINE_FILE));
    spec.args(final_options.split_whitespace());
    spec.arg(request.source_file().to_path_buf());

    init_log_file(&log_file, &spec.render())?;
    let output = match runner.run(&spec) {
        Ok(output) => output,
        Err(e) => {
            return Err(CompileError::Preprocess {
                path: request.source_file().to_path_buf(),
                log: format!("failed to run preprocessor: {e}"),
            })
        }
    };
    append_log(&log_file, &output.stderr)?;
    if !output.success() {
        return Err(CompileError::Preprocess {
            path: request.source_file().to_path_buf(),
            log: logged_error_text(&log_file),
        });
    }

    push_option(
        &mut final_options,
        settings.binary_format.as_deref().unwrap_or(DEFAULT_BINARY_FORMAT),
    );

    // Scan the normalized output: collect inline option directives and fold
    // everything that is neither a directive nor a comment into the hash.
    let file = File::open(&preprocessed).map_err(|e| CompileError::Io {
        path: preprocessed.clone(),
        reason: e.to_string(),
    })?;
    let mut content_hash = Hash64::from_bytes(&[]);
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| CompileError::Io {
            path: preprocessed.clone(),
            reason: e.to_string(),
        })?;
        let line = line.trim_start();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(flags) = line.strip_prefix(INLINE_OPTION_MARKER) {
            push_option(&mut final_options, flags.trim());
        } else if !line.starts_with("//") {
            content_hash = content_hash.mix(Hash64::from_bytes(line.as_bytes()));
        }
    }

    // Architecture-override policy: a forced or detected generation replaces
    // every pre-existing architecture flag with exactly one of its own.
    let arch = request
        .forced_arch()
        .or(settings.forced_arch)
        .or(detected_arch);
    if let Some(sm) = arch {
        final_options = remove_option(&final_options, "-arch", true);
        final_options = remove_option(&final_options, "--gpu-architecture", true);
        push_option(&mut final_options, &format!("-arch sm_{sm}"));
    }

    // Pointer-width policy: newer toolchains need the host pointer width
    // passed explicitly.
    if toolchain.release.unwrap_or(0) >= EXPLICIT_POINTER_WIDTH_RELEASE {
        final_options = remove_option(&final_options, "-m32", false);
        final_options = remove_option(&final_options, "-m64", false);
        final_options = remove_option(&final_options, "--machine", true);
        let width_flag = if cfg!(target_pointer_width = "64") {
            "-m64"
        } else {
            "-m32"
        };
        push_option(&mut final_options, width_flag);
    }

    let artifact_hash = ArtifactHash::new(
        content_hash
            .mix(Hash64::from_bytes(final_options.as_bytes()))
            .mix(toolchain.version_hash),
    );
    let artifact_path = cache_dir.join(artifact_hash.file_name());

    Ok(PreprocessOutcome {
        artifact_hash,
        final_options,
        artifact_path,
    })
}

/// Removes every occurrence of a flag from an option string.
///
/// A token equal to `tag` is removed, together with its following parameter
/// token when `has_param`; a token of the form `tag=value` is removed alone.
/// Token separation is normalized to single spaces.
pub fn remove_option(opts: &str, tag: &str, has_param: bool) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut tokens = opts.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == tag {
            if has_param {
                tokens.next();
            }
            continue;
        }
        if token.len() > tag.len() + 1 && token.starts_with(tag) && token.as_bytes()[tag.len()] == b'=' {
            continue;
        }
        kept.push(token);
    }
    kept.join(" ")
}

/// Appends an option to an option string with single-space separation.
fn push_option(opts: &mut String, option: &str) {
    if option.is_empty() {
        return;
    }
    if !opts.is_empty() && !opts.ends_with(' ') {
        opts.push(' ');
    }
    opts.push_str(option);
}

/// Creates a log file whose first line is the rendered command.
pub(crate) fn init_log_file(path: &Path, command_line: &str) -> Result<(), CompileError> {
    std::fs::write(path, format!("{command_line}\n")).map_err(|e| CompileError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Appends captured stderr bytes to a log file.
pub(crate) fn append_log(path: &Path, bytes: &[u8]) -> Result<(), CompileError> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| CompileError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    file.write_all(bytes).map_err(|e| CompileError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Reads a log file back for inclusion in an error message, skipping the
/// command line it was initialized with.
pub(crate) fn logged_error_text(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text.lines().skip(1).collect::<Vec<_>>().join("\n"),
        Err(_) => String::new(),
    }
}
