pub(crate) mod attempts;
pub(crate) mod definitions;
pub(crate) mod errors;
pub(crate) mod exams;
pub(crate) mod extract;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod router;
