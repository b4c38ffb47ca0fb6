#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorIdentity {
    pub user_id: String,
    pub username: String,
}
