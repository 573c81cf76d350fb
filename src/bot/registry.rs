use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        session::{GuildSession, Pacing},
        voice::{PresenceLookup, VoiceConnector},
    },
    error::SessionError,
};

/// Guild → session map. Absence of an entry means "not joined".
///
/// A join reserves its guild in `joining` before awaiting the connector, so
/// two racing joins for the same guild cannot both connect, while joins for
/// different guilds still connect in parallel.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    joining: DashMap<GuildId, ()>,
    queue_capacity: usize,
    pacing: Pacing,
}

/// Removes the join reservation even if the join future is dropped.
struct JoinReservation<'a> {
    joining: &'a DashMap<GuildId, ()>,
    guild_id: GuildId,
}

impl Drop for JoinReservation<'_> {
    fn drop(&mut self) {
        self.joining.remove(&self.guild_id);
    }
}

impl SessionRegistry {
    pub fn new(queue_capacity: usize, pacing: Pacing) -> Self {
        Self {
            sessions: DashMap::new(),
            joining: DashMap::new(),
            queue_capacity,
            pacing,
        }
    }

    /// Conecta el bot al canal de voz donde está `user_id`.
    pub async fn join(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        presence: &dyn PresenceLookup,
        connector: &dyn VoiceConnector,
    ) -> Result<Arc<GuildSession>, SessionError> {
        let channel_id = presence
            .voice_channel(guild_id, user_id)
            .ok_or(SessionError::NotInVoice)?;

        let _reservation = match self.joining.entry(guild_id) {
            Entry::Occupied(_) => return Err(SessionError::AlreadyJoined),
            Entry::Vacant(slot) => {
                slot.insert(());
                JoinReservation {
                    joining: &self.joining,
                    guild_id,
                }
            }
        };

        if self.sessions.contains_key(&guild_id) {
            info!("Ya hay una sesión de voz en guild {}", guild_id);
            return Err(SessionError::AlreadyJoined);
        }

        info!("🔊 Uniéndose al canal {} en guild {}", channel_id, guild_id);
        let connection = connector.connect(guild_id, channel_id).await?;

        let session = Arc::new(GuildSession::new(
            guild_id,
            channel_id,
            connection,
            self.queue_capacity,
            self.pacing,
        ));
        self.sessions.insert(guild_id, session.clone());

        info!("✅ Sesión creada para guild {}", guild_id);
        Ok(session)
    }

    /// Desconecta y elimina la sesión de la guild.
    ///
    /// The entry stays in the map until the disconnect finishes, so a join
    /// racing this leave gets `AlreadyJoined` instead of reusing the voice
    /// call that is being torn down.
    pub async fn leave(&self, guild_id: GuildId) -> Result<(), SessionError> {
        let session = self.get(guild_id)?;
        if session.is_closed() {
            return Err(SessionError::NotJoined);
        }

        if let Err(e) = session.close().await {
            warn!("Error al desconectar en guild {}: {}", guild_id, e);
        }
        self.sessions
            .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, &session));

        info!("👋 Sesión cerrada en guild {}", guild_id);
        Ok(())
    }

    pub fn get(&self, guild_id: GuildId) -> Result<Arc<GuildSession>, SessionError> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::NotJoined)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sale de todas las guilds (apagado).
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for guild_id in guilds {
            let _ = self.leave(guild_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            testing::{wait_until, RecordingConnector},
            voice::{MockPresenceLookup, VoiceConnection},
        },
        error::VoiceError,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use serenity::model::id::ChannelId;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn guild() -> GuildId {
        GuildId::new(10)
    }

    fn user() -> UserId {
        UserId::new(20)
    }

    fn present() -> MockPresenceLookup {
        let mut presence = MockPresenceLookup::new();
        presence
            .expect_voice_channel()
            .returning(|_, _| Some(ChannelId::new(30)));
        presence
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(10, Pacing::none())
    }

    #[tokio::test]
    async fn second_join_is_already_joined() {
        let registry = registry();
        let connector = RecordingConnector::new();
        let presence = present();

        let session = registry
            .join(guild(), user(), &presence, connector.as_ref())
            .await
            .unwrap();
        assert_eq!(session.channel_id(), ChannelId::new(30));

        let again = registry
            .join(guild(), user(), &presence, connector.as_ref())
            .await;
        assert!(matches!(again, Err(SessionError::AlreadyJoined)));
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn leave_then_join_succeeds_again() {
        let registry = registry();
        let connector = RecordingConnector::new();
        let presence = present();

        registry
            .join(guild(), user(), &presence, connector.as_ref())
            .await
            .unwrap();
        let first = connector.last();

        registry.leave(guild()).await.unwrap();
        assert!(first.is_disconnected());
        assert!(matches!(registry.get(guild()), Err(SessionError::NotJoined)));

        registry
            .join(guild(), user(), &presence, connector.as_ref())
            .await
            .unwrap();
        assert_eq!(connector.connect_count(), 2);
        assert!(registry.get(guild()).is_ok());
    }

    #[tokio::test]
    async fn join_requires_voice_presence() {
        let registry = registry();
        let connector = RecordingConnector::new();
        let mut presence = MockPresenceLookup::new();
        presence
            .expect_voice_channel()
            .withf(|g, u| *g == GuildId::new(10) && *u == UserId::new(20))
            .times(1)
            .returning(|_, _| None);

        let result = registry
            .join(guild(), user(), &presence, connector.as_ref())
            .await;

        assert!(matches!(result, Err(SessionError::NotInVoice)));
        assert_eq!(connector.connect_count(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failed_connect_leaves_no_session_and_no_reservation() {
        let registry = registry();
        let presence = present();

        let refused = registry
            .join(guild(), user(), &presence, RecordingConnector::refusing().as_ref())
            .await;
        assert!(matches!(refused, Err(SessionError::Connect(_))));
        assert!(registry.is_empty());

        let connector = RecordingConnector::new();
        assert!(registry
            .join(guild(), user(), &presence, connector.as_ref())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn leave_without_session_is_not_joined() {
        let registry = registry();
        assert!(matches!(
            registry.leave(guild()).await,
            Err(SessionError::NotJoined)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_joins_create_one_session() {
        let registry = Arc::new(registry());
        let connector = RecordingConnector::new();

        let joins: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let connector = connector.clone();
                tokio::spawn(async move {
                    let presence = present();
                    registry
                        .join(guild(), user(), &presence, connector.as_ref())
                        .await
                        .is_ok()
                })
            })
            .collect();

        let winners = futures::future::join_all(joins)
            .await
            .into_iter()
            .filter(|joined| *joined.as_ref().unwrap())
            .count();

        assert_eq!(winners, 1);
        assert_eq!(connector.connect_count(), 1);
    }

    /// Connection whose disconnect waits until the test opens the gate.
    #[derive(Default)]
    struct GatedConnection {
        disconnecting: AtomicBool,
        gate: Notify,
    }

    #[async_trait]
    impl VoiceConnection for GatedConnection {
        async fn send_frame(&self, _frame: Bytes) -> Result<(), VoiceError> {
            Ok(())
        }

        async fn set_speaking(&self, _speaking: bool) -> Result<(), VoiceError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), VoiceError> {
            self.disconnecting.store(true, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct GatedConnector {
        connections: parking_lot::Mutex<Vec<Arc<GatedConnection>>>,
    }

    #[async_trait]
    impl VoiceConnector for GatedConnector {
        async fn connect(
            &self,
            _guild_id: GuildId,
            _channel_id: ChannelId,
        ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
            let connection = Arc::new(GatedConnection::default());
            self.connections.lock().push(connection.clone());
            Ok(connection)
        }
    }

    #[tokio::test]
    async fn join_during_leave_waits_for_the_disconnect() {
        let registry = Arc::new(registry());
        let connector = Arc::new(GatedConnector::default());
        let presence = present();

        registry
            .join(guild(), user(), &presence, connector.as_ref())
            .await
            .unwrap();
        let first = connector.connections.lock()[0].clone();

        let leaving = tokio::spawn({
            let registry = registry.clone();
            async move { registry.leave(guild()).await }
        });
        wait_until(|| first.disconnecting.load(Ordering::SeqCst)).await;

        let during = registry
            .join(guild(), user(), &presence, connector.as_ref())
            .await;
        assert!(matches!(during, Err(SessionError::AlreadyJoined)));
        assert!(matches!(registry.leave(guild()).await, Err(SessionError::NotJoined)));
        assert_eq!(connector.connections.lock().len(), 1);

        first.gate.notify_one();
        leaving.await.unwrap().unwrap();
        assert!(registry.is_empty());

        registry
            .join(guild(), user(), &presence, connector.as_ref())
            .await
            .unwrap();
        assert_eq!(connector.connections.lock().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_leaves_every_guild() {
        let registry = registry();
        let connector = RecordingConnector::new();
        let presence = present();

        for id in 1..=3 {
            registry
                .join(GuildId::new(id), user(), &presence, connector.as_ref())
                .await
                .unwrap();
        }
        registry.shutdown().await;

        assert!(registry.is_empty());
        assert!(connector
            .connections
            .lock()
            .iter()
            .all(|c| c.is_disconnected()));
    }
}
