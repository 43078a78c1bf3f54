pub mod completion;
pub mod learner;
pub mod reminder;
pub mod topic;
