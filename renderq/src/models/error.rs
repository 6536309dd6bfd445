// Errors handed to a front end travel as their display text.
use crate::{
    domains::job_store::JobStoreError,
    models::settings::SettingsError,
    services::{job_queue::QueueError, session::SessionError},
};

macro_rules! serialize_as_message {
    ($($error:ty),* $(,)?) => {
        $(
            impl serde::Serialize for $error {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    serializer.serialize_str(&self.to_string())
                }
            }
        )*
    };
}

serialize_as_message!(QueueError, SessionError, JobStoreError, SettingsError);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_serialize_to_their_message() {
        let error = QueueError::NotFound("job_9".to_owned());
        assert_eq!(serde_json::to_string(&error).unwrap(), "\"Job job_9 not found\"");
        assert_eq!(
            serde_json::to_value(&SessionError::NotRendering).unwrap(),
            "No render is running"
        );
    }
}
