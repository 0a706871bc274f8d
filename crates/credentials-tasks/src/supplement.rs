//! Supplemental-information sub-task handle.

use crate::authentication::{SubTaskId, SubTaskRequest};
use crate::models::{Credentials, FieldSpecification, Form};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Pause in a task's flow while the user fills in extra form fields.
///
/// Call [`submit`](Self::submit) with the completed form, or
/// [`cancel`](Self::cancel) when the user dismisses it. Only the first
/// resolving call has an effect; the owning task resumes polling once the
/// submission succeeds. Clones share the same sub-task.
#[derive(Clone)]
pub struct SupplementInformationTask {
    inner: Arc<Inner>,
}

struct Inner {
    sub_task: SubTaskId,
    credentials: Credentials,
    fields: Vec<FieldSpecification>,
    requests: mpsc::UnboundedSender<SubTaskRequest>,
}

impl SupplementInformationTask {
    pub(crate) fn new(
        sub_task: SubTaskId,
        credentials: Credentials,
        fields: Vec<FieldSpecification>,
        requests: mpsc::UnboundedSender<SubTaskRequest>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sub_task,
                credentials,
                fields,
                requests,
            }),
        }
    }

    /// The credentials awaiting supplemental information.
    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// The fields the provider asked for.
    pub fn fields(&self) -> &[FieldSpecification] {
        &self.inner.fields
    }

    /// An empty form for [`fields`](Self::fields).
    pub fn form(&self) -> Form {
        Form::new(&self.inner.fields)
    }

    /// Send the form values to the service.
    pub fn submit(&self, form: Form) {
        self.send(SubTaskRequest::Submit {
            sub_task: self.inner.sub_task,
            fields: form.make_fields(),
        });
    }

    /// Tell the service to stop waiting. The owning task fails as cancelled.
    pub fn cancel(&self) {
        self.send(SubTaskRequest::CancelSupplement {
            sub_task: self.inner.sub_task,
        });
    }

    fn send(&self, request: SubTaskRequest) {
        if self.inner.requests.send(request).is_err() {
            warn!(
                credentials_id = %self.inner.credentials.id,
                "supplemental information request dropped, task already finished"
            );
        }
    }
}

impl fmt::Debug for SupplementInformationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupplementInformationTask")
            .field("credentials_id", &self.inner.credentials.id)
            .field("fields", &self.inner.fields.len())
            .finish()
    }
}
