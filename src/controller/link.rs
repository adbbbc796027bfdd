//! Link synchronization
//!
//! A Link injects configuration into a component, which rolls its pod. The
//! link is considered applied once a pod other than the one running when the
//! link started is up; the peer Link is then told the component finished
//! linking.

use tracing::{debug, info, warn};

use super::client::ComponentKubeClient;
use crate::crd::{ComponentStatus, LinkState, LinkStatus};

/// What happened to the tracked links during one pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkSync {
    /// Links still waiting for the pod to roll
    pub waiting: Vec<String>,
    /// Error messages of links that couldn't be completed
    pub errors: Vec<String>,
    /// Links completed during this pass
    pub completed: Vec<String>,
}

impl LinkSync {
    /// Whether any link keeps the component in the linking phase
    pub fn is_linking(&self) -> bool {
        !self.waiting.is_empty() || !self.errors.is_empty()
    }

    /// Status message while linking
    pub fn message(&self) -> String {
        if self.errors.is_empty() {
            format!(
                "waiting for pod to restart after linking {}",
                self.waiting.join(", ")
            )
        } else {
            self.errors.join("; ")
        }
    }
}

/// Advance `Started` and `Errored` links in `status` given the current pod.
///
/// Entries are updated in place at their index. `pod_name` is the pod
/// running the component now, if one could be found.
pub async fn sync_links(
    component: &str,
    namespace: &str,
    status: &mut ComponentStatus,
    pod_name: Option<&str>,
    client: &dyn ComponentKubeClient,
) -> LinkSync {
    let mut sync = LinkSync::default();

    for link in status.links.iter_mut() {
        if link.status == LinkState::Linked {
            continue;
        }

        let rolled = pod_name.filter(|pod| *pod != link.original_pod_name);
        let Some(pod) = rolled else {
            debug!(component, link = %link.name, "waiting for pod restart");
            sync.waiting.push(link.name.clone());
            continue;
        };

        let peer = match client.get_link(&link.name, namespace).await {
            Ok(peer) => peer,
            Err(e) => {
                warn!(component, link = %link.name, error = %e, "link lookup failed");
                None
            }
        };
        let Some(peer) = peer else {
            let message = format!("couldn't retrieve '{}' link", link.name);
            warn!(component, link = %link.name, "{message}");
            link.status = LinkState::Errored;
            sync.errors.push(message);
            continue;
        };

        let note = LinkStatus::with_message(format!("'{component}' finished linking"));
        if let Err(e) = client
            .patch_link_status(&link.name, namespace, &note)
            .await
        {
            warn!(component, link = %link.name, error = %e, "couldn't update link status");
        }

        info!(component, link = %link.name, pod, peer = ?peer.metadata.name, "link completed");
        link.status = LinkState::Linked;
        link.original_pod_name.clear();
        sync.completed.push(link.name.clone());
        status.pod_name = Some(pod.to_string());
    }

    sync
}
