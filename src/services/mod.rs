pub(crate) mod access;
pub(crate) mod errors;
pub(crate) mod exam_session;
pub(crate) mod scoring;
pub(crate) mod snapshot;
pub(crate) mod timing;
