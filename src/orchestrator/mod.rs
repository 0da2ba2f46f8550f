//! Application-level orchestration utilities.
//!
//! This module owns the upload run lifecycle (preconditions, replay, result)
//! and post-run processing such as history auto-save and exports. The CLI
//! calls into this module to keep responsibilities separated.

mod post_process;
mod upload;

pub(crate) use post_process::process_run_completion;
pub(crate) use upload::{run_upload, UploadError};
