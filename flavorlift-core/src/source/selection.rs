use super::types::{Derivative, SelectionPolicy};

/// Picks the derivative to download.
///
/// A ready derivative in the target container at the preferred tier wins;
/// otherwise the first ready derivative in the target container is used.
/// The preferred match does not depend on the order the platform returned.
pub fn select_derivative<'a>(
    derivatives: &'a [Derivative],
    policy: &SelectionPolicy,
) -> Option<&'a Derivative> {
    let candidates = || {
        derivatives.iter().filter(|derivative| {
            derivative.status.is_ready()
                && derivative
                    .extension()
                    .eq_ignore_ascii_case(&policy.target_extension)
        })
    };
    candidates()
        .find(|derivative| derivative.flavor_params_id == Some(policy.preferred_tier))
        .or_else(|| candidates().next())
}
