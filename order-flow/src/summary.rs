use crate::{
    payload::Payload,
    step::{BRANCH_KEY, Branch, Field},
};

/// Human-readable rendering of a payload.
///
/// The same string is shown on the review step, stored as the order summary
/// and sent to staff, so it must depend on nothing but the payload.
pub fn payload_summary(payload: &Payload) -> String {
    let branch = payload.get(BRANCH_KEY).unwrap_or_default();
    let branch_label = branch
        .parse::<Branch>()
        .map(|b| b.label())
        .unwrap_or(branch);

    let mut lines = vec![format!("Тип заявки: {}", branch_label)];
    for (key, value) in payload.iter() {
        if key == BRANCH_KEY || value.is_empty() {
            continue;
        }
        let label = key.parse::<Field>().map(|f| f.label()).unwrap_or(key);
        lines.push(format!("• {}: {}", label, value));
    }
    lines.join("\n")
}
