use crate::contract::{BuildInfoError, BuildInfoStore};

/// Appends the build-name/build-number properties for a build to `props`.
///
/// Returns `props` unchanged when either the build name or number is empty. A `;` separator
/// is inserted only when both sides are non-empty and `props` does not already end with one.
pub fn add_build_props<B>(
    props: &str,
    build_name: &str,
    build_number: &str,
    formatter: &B,
) -> Result<String, BuildInfoError>
where
    B: BuildInfoStore + ?Sized,
{
    if build_name.is_empty() || build_number.is_empty() {
        return Ok(props.to_string());
    }
    let build_props = formatter.create_build_properties(build_name, build_number)?;

    let mut combined = String::with_capacity(props.len() + build_props.len() + 1);
    combined.push_str(props);
    if !props.is_empty() && !props.ends_with(';') && !build_props.is_empty() {
        combined.push(';');
    }
    combined.push_str(&build_props);
    Ok(combined)
}
