//! Push topic resolution
//!
//! Push certificates carry their topic as the UserID attribute
//! (OID 0.9.2342.19200300.100.1.1) of the subject distinguished name. The
//! resolved value scopes outbound push routing and must match the topic the
//! push gateway expects for the credential, or delivery is silently
//! rejected upstream.

use openssl::nid::Nid;
use openssl::x509::X509Ref;

use crate::error::{CoreError, Result};

/// Extract the push topic from a certificate's subject.
///
/// Fails with [`CoreError::TopicNotFound`] when no UserID attribute is
/// present, or when the attribute is present but not string-typed.
pub fn push_topic(cert: &X509Ref) -> Result<String> {
    for entry in cert.subject_name().entries() {
        if entry.object().nid() == Nid::USERID {
            return std::str::from_utf8(entry.data().as_slice())
                .map(str::to_string)
                .map_err(|_| CoreError::TopicNotFound);
        }
    }
    Err(CoreError::TopicNotFound)
}
