// Stalled-learner re-engagement: opt-in settings, eligibility, email delivery
// and the cron-triggered dispatch run.

pub mod dispatcher;
pub mod email;
pub mod handlers;
pub mod settings;
