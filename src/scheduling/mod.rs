mod birthday_sweep;
mod fire_loop;
mod scheduler;

pub use scheduler::ReminderScheduler;
