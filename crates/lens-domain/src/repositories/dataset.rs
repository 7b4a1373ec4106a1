use crate::services::audit::AuditEvent;
use crate::value_objects::announcement::AnnouncementEvent;
use crate::value_objects::reaction::ReactionRecord;

/// Destination for dataset rows and the audit trail. Implementations should
/// make each call durable before returning so a crashed run keeps its output.
pub trait DatasetSink {
    fn write_record(&mut self, announcement: &AnnouncementEvent, record: &ReactionRecord) -> Result<(), String>;
    fn write_audit(&mut self, event: &AuditEvent) -> Result<(), String>;
    fn finish(&mut self) -> Result<(), String>;
}
