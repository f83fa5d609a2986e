//! End-to-end workflows over the two-tier compile cache with a scripted
//! toolchain standing in for the external compiler.

use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use cuforge_cache::{CacheSettings, CompileCache, CompileError, CompileRequest};
use cuforge_common::Hash64;
use cuforge_toolchain::{CommandRunner, CommandSpec, RunOutput, ToolchainInfo};
use tempfile::TempDir;

/// Scripted toolchain runner: preprocessor runs write a fixed body to the
/// `-o` target, compile runs either write fixed artifact bytes or fail with
/// fixed stderr. Call counts are observable through an `Rc` handle.
struct ScriptedToolchain {
    preprocessed: String,
    artifact: Result<Vec<u8>, String>,
    preprocess_calls: Cell<usize>,
    compile_calls: Cell<usize>,
}

impl ScriptedToolchain {
    fn succeeding(preprocessed: &str, artifact: &[u8]) -> Rc<Self> {
        Rc::new(Self {
            preprocessed: preprocessed.to_string(),
            artifact: Ok(artifact.to_vec()),
            preprocess_calls: Cell::new(0),
            compile_calls: Cell::new(0),
        })
    }

    fn failing(preprocessed: &str, stderr: &str) -> Rc<Self> {
        Rc::new(Self {
            preprocessed: preprocessed.to_string(),
            artifact: Err(stderr.to_string()),
            preprocess_calls: Cell::new(0),
            compile_calls: Cell::new(0),
        })
    }
}

#[derive(Clone)]
struct Runner(Rc<ScriptedToolchain>);

impl CommandRunner for Runner {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<RunOutput> {
        let argv = spec.argv();
        let out_path = argv
            .iter()
            .position(|a| a.to_str() == Some("-o"))
            .map(|i| PathBuf::from(&argv[i + 1]))
            .expect("every toolchain run carries -o");

        if argv.iter().any(|a| a.to_str() == Some("-E")) {
            self.0.preprocess_calls.set(self.0.preprocess_calls.get() + 1);
            fs::write(&out_path, &self.0.preprocessed).unwrap();
            return Ok(RunOutput {
                status: Some(0),
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }

        self.0.compile_calls.set(self.0.compile_calls.get() + 1);
        match &self.0.artifact {
            Ok(bytes) => {
                fs::write(&out_path, bytes).unwrap();
                Ok(RunOutput {
                    status: Some(0),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                })
            }
            Err(stderr) => Ok(RunOutput {
                status: Some(1),
                stdout: Vec::new(),
                stderr: stderr.clone().into_bytes(),
            }),
        }
    }
}

fn toolchain_info() -> ToolchainInfo {
    ToolchainInfo {
        bin_dir: PathBuf::from("/toolchain/bin"),
        host_bin_dir: PathBuf::from("/host/bin"),
        compiler_include_dir: PathBuf::from("/toolchain/include"),
        host_include_dir: PathBuf::from("/host/include"),
        version_hash: Hash64::from_bytes(b"stub toolchain version"),
        release: Some(123),
    }
}

fn open_cache(cache_dir: &std::path::Path, stub: &Rc<ScriptedToolchain>) -> CompileCache {
    let mut cache = CompileCache::open(cache_dir, CacheSettings::default());
    cache.set_toolchain(toolchain_info());
    cache.set_runner(Box::new(Runner(stub.clone())));
    cache
}

fn write_kernel(dir: &std::path::Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "__global__ void k() {}\n").unwrap();
    path
}

#[test]
fn fresh_cache_compile_produces_expected_layout() {
    let tmp = TempDir::new().unwrap();
    let source = write_kernel(tmp.path(), "k.cu");
    let cache_dir = tmp.path().join("cudacache");

    let stub = ScriptedToolchain::succeeding("int x;\n", &[0xca, 0xfe, 0xba, 0xbe]);
    let mut cache = open_cache(&cache_dir, &stub);

    let request = CompileRequest::new(&source);
    let artifact = cache.lookup_or_compile(&request).unwrap();

    // The cache directory was created and the artifact wraps the stub bytes.
    assert!(cache_dir.is_dir());
    assert_eq!(artifact.bytes(), &[0xca, 0xfe, 0xba, 0xbe]);

    // An empty request injects only the preamble newlines.
    let defines = fs::read_to_string(cache_dir.join("defines.inl")).unwrap();
    assert_eq!(defines, "\n\n");

    // Exactly one artifact, named by the 16-hex-char artifact hash.
    let cubins: Vec<String> = fs::read_dir(&cache_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".cubin"))
        .collect();
    assert_eq!(cubins.len(), 1);
    let stem = cubins[0].strip_suffix(".cubin").unwrap();
    assert_eq!(stem.len(), 16);
    assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(
        fs::read(cache_dir.join(&cubins[0])).unwrap(),
        vec![0xca, 0xfe, 0xba, 0xbe]
    );
}

#[test]
fn failed_compile_surfaces_stderr_and_leaves_no_artifact() {
    let tmp = TempDir::new().unwrap();
    let source = write_kernel(tmp.path(), "k.cu");
    let cache_dir = tmp.path().join("cudacache");

    let stub = ScriptedToolchain::failing("int x;\n", "syntax error");
    let mut cache = open_cache(&cache_dir, &stub);

    let err = cache
        .lookup_or_compile(&CompileRequest::new(&source))
        .unwrap_err();
    assert!(matches!(err, CompileError::Compile { .. }));
    assert!(err.to_string().contains("syntax error"));

    let cubins = fs::read_dir(&cache_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".cubin"))
        .count();
    assert_eq!(cubins, 0, "failure must not publish an artifact");
}

#[test]
fn existing_artifact_is_reused_without_compiling() {
    let tmp = TempDir::new().unwrap();
    let source = write_kernel(tmp.path(), "k.cu");
    let cache_dir = tmp.path().join("cudacache");
    let request = CompileRequest::new(&source);

    // First context compiles once.
    let first_stub = ScriptedToolchain::succeeding("int x;\n", &[1, 2, 3, 4]);
    open_cache(&cache_dir, &first_stub)
        .lookup_or_compile(&request)
        .unwrap();
    assert_eq!(first_stub.compile_calls.get(), 1);

    // A fresh context (fresh Tier 1) finds the artifact on disk: it must
    // preprocess to learn the hash, but never spawn the compiler.
    let second_stub = ScriptedToolchain::succeeding("int x;\n", &[1, 2, 3, 4]);
    let artifact = open_cache(&cache_dir, &second_stub)
        .lookup_or_compile(&request)
        .unwrap();
    assert_eq!(second_stub.preprocess_calls.get(), 1);
    assert_eq!(second_stub.compile_calls.get(), 0);
    assert_eq!(artifact.bytes(), &[1, 2, 3, 4]);
}

#[test]
fn same_request_twice_is_memoized_in_process() {
    let tmp = TempDir::new().unwrap();
    let source = write_kernel(tmp.path(), "k.cu");

    let stub = ScriptedToolchain::succeeding("int x;\n", &[5, 5]);
    let mut cache = open_cache(&tmp.path().join("cudacache"), &stub);
    let request = CompileRequest::new(&source);

    let first = cache.lookup_or_compile(&request).unwrap();
    let second = cache.lookup_or_compile(&request).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(stub.preprocess_calls.get(), 1);
    assert_eq!(stub.compile_calls.get(), 1);
}

#[test]
fn kernels_with_identical_preprocessed_content_share_one_artifact() {
    let tmp = TempDir::new().unwrap();
    let cache_dir = tmp.path().join("cudacache");
    let first = write_kernel(tmp.path(), "first.cu");
    let second = write_kernel(tmp.path(), "second.cu");

    // Both kernels preprocess to the same body, so the second request hits
    // Tier 2 under a different fingerprint.
    let stub = ScriptedToolchain::succeeding("__global__ void k() {}\n", &[8, 8, 8]);
    let mut cache = open_cache(&cache_dir, &stub);

    cache.lookup_or_compile(&CompileRequest::new(&first)).unwrap();
    cache.lookup_or_compile(&CompileRequest::new(&second)).unwrap();

    assert_eq!(stub.preprocess_calls.get(), 2);
    assert_eq!(stub.compile_calls.get(), 1, "second kernel reuses the artifact");
    assert_eq!(cache.memory_entries(), 2);

    let cubins = fs::read_dir(&cache_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".cubin"))
        .count();
    assert_eq!(cubins, 1);
}

#[test]
fn defines_force_distinct_artifacts() {
    let tmp = TempDir::new().unwrap();
    let source = write_kernel(tmp.path(), "k.cu");

    let stub = ScriptedToolchain::succeeding("int x;\n", &[1]);
    let mut cache = open_cache(&tmp.path().join("cudacache"), &stub);

    let mut request = CompileRequest::new(&source);
    request.define("BLOCK", "128");
    cache.lookup_or_compile(&request).unwrap();

    request.define("BLOCK", "256");
    cache.lookup_or_compile(&request).unwrap();

    // Different fingerprints, so the second request ran the pipeline again.
    assert_eq!(stub.preprocess_calls.get(), 2);
    assert_eq!(cache.memory_entries(), 2);
}

#[test]
fn forced_architecture_flows_into_compile_command() {
    let tmp = TempDir::new().unwrap();
    let source = write_kernel(tmp.path(), "k.cu");

    // Capture compile argv through a recording runner.
    struct Recording {
        inner: Runner,
        compile_argv: std::cell::RefCell<Vec<String>>,
    }
    impl CommandRunner for Recording {
        fn run(&self, spec: &CommandSpec) -> std::io::Result<RunOutput> {
            if !spec.argv().iter().any(|a| a.to_str() == Some("-E")) {
                *self.compile_argv.borrow_mut() = spec
                    .argv()
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect();
            }
            self.inner.run(spec)
        }
    }

    let stub = ScriptedToolchain::succeeding("int x;\n", &[1]);
    let recording = Rc::new(Recording {
        inner: Runner(stub.clone()),
        compile_argv: std::cell::RefCell::new(Vec::new()),
    });

    #[derive(Clone)]
    struct Shared(Rc<Recording>);
    impl CommandRunner for Shared {
        fn run(&self, spec: &CommandSpec) -> std::io::Result<RunOutput> {
            self.0.run(spec)
        }
    }

    let mut cache = CompileCache::open(tmp.path().join("cudacache"), CacheSettings::default());
    cache.set_toolchain(toolchain_info());
    cache.set_runner(Box::new(Shared(recording.clone())));
    cache.set_detected_arch(20);

    let mut request = CompileRequest::new(&source);
    request.set_options("-arch sm_10");
    cache.lookup_or_compile(&request).unwrap();

    let argv = recording.compile_argv.borrow();
    let arch_count = argv.iter().filter(|a| *a == "-arch").count();
    assert_eq!(arch_count, 1, "exactly one architecture flag");
    let arch_idx = argv.iter().position(|a| a == "-arch").unwrap();
    assert_eq!(argv[arch_idx + 1], "sm_20");
    assert!(!argv.iter().any(|a| a == "sm_10"));
}

#[test]
fn observer_sees_compile_lifecycle() {
    use cuforge_cache::ProgressObserver;
    use std::path::Path;

    #[derive(Default)]
    struct Recorder {
        events: std::cell::RefCell<Vec<String>>,
    }
    struct SharedRecorder(Rc<Recorder>);
    impl ProgressObserver for SharedRecorder {
        fn compile_started(&self, source: &Path) {
            self.0
                .events
                .borrow_mut()
                .push(format!("started {}", source.file_name().unwrap().to_string_lossy()));
        }
        fn compile_finished(&self, success: bool) {
            self.0.events.borrow_mut().push(format!("finished {success}"));
        }
    }

    let tmp = TempDir::new().unwrap();
    let source = write_kernel(tmp.path(), "k.cu");

    let stub = ScriptedToolchain::succeeding("int x;\n", &[1]);
    let recorder = Rc::new(Recorder::default());
    let mut cache = open_cache(&tmp.path().join("cudacache"), &stub);
    cache.set_observer(Box::new(SharedRecorder(recorder.clone())));

    let request = CompileRequest::new(&source);
    cache.lookup_or_compile(&request).unwrap();
    assert_eq!(
        *recorder.events.borrow(),
        vec!["started k.cu".to_string(), "finished true".to_string()]
    );

    // A Tier-1 hit does not re-notify.
    cache.lookup_or_compile(&request).unwrap();
    assert_eq!(recorder.events.borrow().len(), 2);
}
