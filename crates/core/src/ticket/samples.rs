//! Built-in sample tickets for demos and smoke tests.
//!
//! One ticket per common shape of support request: an outage, a how-to
//! question, a feature request, a billing dispute and a broken integration.

use super::TicketSubmission;

/// The sample tickets, in a stable order.
pub fn sample_submissions() -> Vec<TicketSubmission> {
    vec![
        TicketSubmission::new(
            "sample-001",
            "Every call to /api/v2/users has returned 500 Internal Server Error for the \
             last two hours. Production is down for all of our customers and we are \
             losing revenue. Our contract requires 99.9% uptime, please help immediately.",
        )
        .with_subject("API returning 500 errors, production down")
        .with_customer_email("cto@acmecorp.com"),
        TicketSubmission::new(
            "sample-002",
            "I want to export our analytics data to CSV for monthly reporting but cannot \
             find the option in the dashboard, and the documentation does not say where \
             it lives. Could you walk me through the steps?",
        )
        .with_subject("How do I export data to CSV?")
        .with_customer_email("analyst@smallbiz.com"),
        TicketSubmission::new(
            "sample-003",
            "More than thirty of our users have asked for a dark mode in the mobile app \
             on both iOS and Android (version 2.4.1). Is it on your roadmap?",
        )
        .with_subject("Feature request: dark mode for the mobile app")
        .with_customer_email("product@techstartup.io"),
        TicketSubmission::new(
            "sample-004",
            "My Pro subscription was charged twice this month, $49.99 on the 5th and \
             again on the 15th. It should bill once a month. Please investigate and \
             refund the duplicate charge on account acc_7892341.",
        )
        .with_subject("Charged twice this month")
        .with_customer_email("finance@enterprise.com"),
        TicketSubmission::new(
            "sample-005",
            "Our Slack integration stopped syncing messages to the dashboard yesterday. \
             The integration page still shows Connected, but the last synced message is \
             two days old. Not critical, but we rely on it for our support workflow.",
        )
        .with_subject("Slack integration not syncing messages")
        .with_customer_email("support-lead@techcorp.com"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_samples_are_valid_and_unique() {
        let samples = sample_submissions();
        assert_eq!(samples.len(), 5);

        let ids: HashSet<_> = samples.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), samples.len());

        for sample in &samples {
            assert!(sample.validate().is_ok(), "sample {} invalid", sample.id);
            assert!(sample.subject.is_some());
        }
    }
}
