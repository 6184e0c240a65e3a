//! Cascade field mapping.

use crudguard_proto::{CascadeField, CascadeInclude};

/// Map declared cascade fields to include entries.
///
/// Bare names pass through; `{field, cascadeFields}` becomes
/// `{association, include}` with the nested fields mapped the same way.
/// Recursion follows the input, which the caller bounds.
pub fn cascade_fields_to_include(fields: &[CascadeField]) -> Vec<CascadeInclude> {
    fields
        .iter()
        .map(|field| match field {
            CascadeField::Name(name) => CascadeInclude::Name(name.clone()),
            CascadeField::Nested {
                field,
                cascade_fields,
            } => CascadeInclude::Association {
                association: field.clone(),
                include: cascade_fields.as_deref().map(cascade_fields_to_include),
            },
        })
        .collect()
}
