mod rmsprop;

pub use rmsprop::RmsProp;

/// Update rule applied to one tensor's parameters from one gradient slice.
///
/// One instance exists per tensor slot; any accumulator state it keeps is
/// therefore shared by every worker contributing gradients to that tensor.
pub trait Optimizer: Send {
    /// Updates the parameters in place according to the algorithm's learning rule.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient used for taking the step.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]);
}
