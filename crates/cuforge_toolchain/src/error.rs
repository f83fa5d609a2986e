//! Error types for toolchain discovery.

/// Errors raised while locating the external compiler toolchain.
///
/// Each variant carries a user-actionable message naming the environment
/// variable or install step that fixes it. The enum is `Clone` because a
/// failed resolution is remembered by the locator and returned verbatim on
/// every subsequent call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolchainError {
    /// No candidate directory contained a compiler binary that answered the
    /// version query with the expected signature.
    #[error(
        "unable to detect the CUDA toolkit binary directory; \
         set the CUDA_BIN_PATH environment variable to the directory containing nvcc"
    )]
    CompilerNotFound,

    /// No candidate directory contained the host build toolchain.
    #[error(
        "unable to detect the host toolchain binary directory; \
         ensure the host compiler is on PATH"
    )]
    HostToolchainNotFound,

    /// No candidate directory contained the compiler's headers.
    #[error(
        "unable to detect the CUDA toolkit include directory; \
         set the CUDA_INC_PATH environment variable to the directory containing cuda.h"
    )]
    CompilerIncludeNotFound,

    /// No candidate directory contained the host toolchain's headers.
    #[error(
        "unable to detect the host include directory; \
         set the INCLUDE environment variable"
    )]
    HostIncludeNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiler_not_found_names_env_var() {
        let msg = ToolchainError::CompilerNotFound.to_string();
        assert!(msg.contains("CUDA_BIN_PATH"));
        assert!(msg.contains("nvcc"));
    }

    #[test]
    fn include_not_found_names_env_var() {
        let msg = ToolchainError::CompilerIncludeNotFound.to_string();
        assert!(msg.contains("CUDA_INC_PATH"));
        assert!(msg.contains("cuda.h"));
    }

    #[test]
    fn host_include_not_found_names_env_var() {
        let msg = ToolchainError::HostIncludeNotFound.to_string();
        assert!(msg.contains("INCLUDE"));
    }

    #[test]
    fn errors_are_cloneable_and_comparable() {
        let err = ToolchainError::HostToolchainNotFound;
        assert_eq!(err.clone(), err);
    }
}
