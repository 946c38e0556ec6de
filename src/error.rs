use thiserror::Error;

/// Structural and I/O failures of a conversion. Any of these aborts the
/// operation that returned it.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("instance target '{0}' does not exist")]
    MissingInstanceTarget(String),

    #[error("node '{0}' instantiates itself through instance_node")]
    CyclicInstance(String),

    #[error("controller '{0}' is part of a controller cycle")]
    CyclicController(String),

    #[error("skin of mesh '{mesh}' binds joint '{joint}' which is an ancestor of the mesh")]
    SkinBindsAncestor { mesh: String, joint: String },

    #[error("LOD distances must be ascending, got {0:?}")]
    InvalidLodDistances([f32; 4]),

    #[error("{0} joints are used for skinning, at most 255 fit the vertex format")]
    TooManyJoints(usize),

    #[error("model has not been converted yet")]
    NotConverted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to write XML: {0}")]
    Xml(#[from] xmltree::Error),
}

pub type ConvertResult<T> = Result<T, ConvertError>;
