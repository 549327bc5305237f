wire_enum! {
    pub enum ContactCategory as "category" {
        GeneralInquiry => "General Inquiry",
        ServiceRequest => "Service Request",
        Complaint => "Complaint",
        Feedback => "Feedback",
        Partnership => "Partnership",
        TechnicalSupport => "Technical Support",
        Other => "Other",
    }
}

wire_enum! {
    /// Support ticket progress: `new -> in_progress -> resolved -> closed`.
    pub enum ContactStatus as "status" {
        New => "new",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
}

wire_enum! {
    pub enum ContactPriority as "priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

impl Default for ContactCategory {
    fn default() -> Self {
        ContactCategory::GeneralInquiry
    }
}

impl Default for ContactStatus {
    fn default() -> Self {
        ContactStatus::New
    }
}

impl Default for ContactPriority {
    fn default() -> Self {
        ContactPriority::Medium
    }
}

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_SUBJECT_LEN: usize = 200;
pub const MAX_MESSAGE_LEN: usize = 2000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(ContactCategory::default().as_str(), "General Inquiry");
        assert_eq!(ContactStatus::default(), ContactStatus::New);
        assert_eq!(ContactPriority::default(), ContactPriority::Medium);
    }

    #[test]
    fn rejects_unknown_priority() {
        let err = "critical".parse::<ContactPriority>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid priority: critical");
    }
}
