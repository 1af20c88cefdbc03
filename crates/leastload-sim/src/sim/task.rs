use leastload::{Task, TaskError};

/// The simulated unit of work: the sine of an integer angle in radians.
#[derive(Debug, Clone, Copy, Default)]
pub struct SineTask;

impl Task<i32> for SineTask {
    type Output = f64;

    fn run(&self, input: i32) -> Result<f64, TaskError> {
        Ok(f64::from(input).sin())
    }
}
