use std::collections::HashSet;
use std::sync::Arc;

/// Fixed set of user ids allowed to run admin commands. Built once at
/// startup from configuration; the owner is always a member.
#[derive(Debug, Clone)]
pub struct AdminGate {
    admins: Arc<HashSet<i64>>,
}

impl AdminGate {
    pub fn new(owner_id: i64, admin_ids: impl IntoIterator<Item = i64>) -> Self {
        let mut admins: HashSet<i64> = admin_ids.into_iter().collect();
        admins.insert(owner_id);
        Self {
            admins: Arc::new(admins),
        }
    }

    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }
}
