pub(crate) mod attempts;
pub(crate) mod definitions;
pub(crate) mod scheduled_exams;
