pub mod delete_files;

pub use delete_files::{
    DeleteFilesOperation, DeleteFilesOperationRequest, DeleteFilesOperationResult,
};
