//! Outcome descriptions published by the API, mapped to stable keys the UI
//! filters on. Descriptions change wording occasionally; keys do not.

/// Key for outcomes that are absent or not in the table
pub const UNKNOWN_OUTCOME: &str = "unknown";

/// `(key, description)` pairs
pub const OUTCOMES: &[(&str, &str)] = &[
    ("awaitingCourtResult", "Awaiting court outcome"),
    ("courtResultUnavailable", "Court result unavailable"),
    ("unableToProceed", "Court case unable to proceed"),
    ("localResolution", "Local resolution"),
    ("noFurtherAction", "Investigation complete; no suspect identified"),
    ("deprivedOfProperty", "Offender deprived of property"),
    ("fined", "Offender fined"),
    ("absoluteDischarge", "Offender given absolute discharge"),
    ("cautioned", "Offender given a caution"),
    ("drugsPossessionWarning", "Offender given a drugs possession warning"),
    ("penaltyNoticeIssued", "Offender given a penalty notice"),
    ("communityPenalty", "Offender given community sentence"),
    ("conditionalDischarge", "Offender given conditional discharge"),
    ("suspendedSentence", "Offender given suspended prison sentence"),
    ("imprisoned", "Offender sent to prison"),
    ("otherCourtDisposal", "Offender otherwise dealt with"),
    ("compensation", "Offender ordered to pay compensation"),
    ("sentencedInAnotherCase", "Suspect charged as part of another case"),
    ("charged", "Suspect charged"),
    ("notGuilty", "Defendant found not guilty"),
    ("sentToCrownCourt", "Defendant sent to Crown Court"),
    ("unableToProsecute", "Unable to prosecute suspect"),
    ("formalActionNotInPublicInterest", "Formal action is not in the public interest"),
    ("actionTakenByAnotherOrganisation", "Action to be taken by another organisation"),
    (
        "furtherInvestigationNotInPublicInterest",
        "Further investigation is not in the public interest",
    ),
    (
        "furtherActionNotInPublicInterest",
        "Further action is not in the public interest",
    ),
    ("underInvestigation", "Under investigation"),
    ("statusUpdateUnavailable", "Status update unavailable"),
    (UNKNOWN_OUTCOME, "Outcome unknown"),
];

/// Stable key for an outcome description
pub fn outcome_key(description: &str) -> &'static str {
    OUTCOMES
        .iter()
        .find(|(_, text)| *text == description)
        .map(|(key, _)| *key)
        .unwrap_or(UNKNOWN_OUTCOME)
}

/// Description for a key, if the key is known
pub fn outcome_description(key: &str) -> Option<&'static str> {
    OUTCOMES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, text)| *text)
}
