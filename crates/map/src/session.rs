use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use model::Coordinates;

use crate::{
    options::MapOptions,
    widget::{MapWidget, MapWidgetFactory},
    MapError, SessionClosedError,
};

/// One live map bound to one container. After [`MapSessionManager::destroy_session`]
/// every operation fails with [`SessionClosedError`].
pub struct MapSession<W: MapWidget> {
    id: u64,
    container: String,
    widget: Option<W>,
    live_sessions: Arc<AtomicUsize>,
}

impl<W: MapWidget> MapSession<W> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn is_open(&self) -> bool {
        self.widget.is_some()
    }

    pub fn ensure_open(&self) -> Result<(), SessionClosedError> {
        match self.widget {
            Some(_) => Ok(()),
            None => Err(self.closed()),
        }
    }

    pub fn add_marker(
        &mut self,
        coordinates: Coordinates,
        tooltip: &str,
    ) -> Result<W::Marker, SessionClosedError> {
        Ok(self.widget_mut()?.add_marker(coordinates, tooltip))
    }

    pub fn update_marker(
        &mut self,
        marker: &mut W::Marker,
        coordinates: Coordinates,
        tooltip: &str,
    ) -> Result<(), SessionClosedError> {
        self.widget_mut()?
            .update_marker(marker, coordinates, tooltip);
        Ok(())
    }

    pub fn remove_marker(&mut self, marker: W::Marker) -> Result<(), SessionClosedError> {
        self.widget_mut()?.remove_marker(marker);
        Ok(())
    }

    fn closed(&self) -> SessionClosedError {
        SessionClosedError { session: self.id }
    }

    fn widget_mut(&mut self) -> Result<&mut W, SessionClosedError> {
        let closed = self.closed();
        self.widget.as_mut().ok_or(closed)
    }

    fn close(&mut self) -> Result<(), SessionClosedError> {
        let widget = self.widget.take().ok_or(self.closed())?;
        widget.remove();
        self.live_sessions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<W: MapWidget> Drop for MapSession<W> {
    fn drop(&mut self) {
        if self.is_open() {
            log::warn!(
                "map session {} on '{}' was dropped without being destroyed",
                self.id,
                self.container
            );
            let _ = self.close();
        }
    }
}

/// Creates and destroys map sessions. Every created session must be passed to
/// `destroy_session` exactly once.
pub struct MapSessionManager<F: MapWidgetFactory> {
    factory: F,
    options: MapOptions,
    next_id: AtomicU64,
    live_sessions: Arc<AtomicUsize>,
}

impl<F: MapWidgetFactory> MapSessionManager<F> {
    pub fn new(factory: F, options: MapOptions) -> Self {
        Self {
            factory,
            options,
            next_id: AtomicU64::new(1),
            live_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    pub fn create_session(&self, container: &str) -> Result<MapSession<F::Widget>, MapError> {
        let mut widget = self.factory.create_map(container, &self.options)?;
        for (control, position) in &self.options.controls {
            widget.add_control(*control, *position);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.live_sessions.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "created map session {id} on '{container}' ({})",
            self.options.style.style_url()
        );

        Ok(MapSession {
            id,
            container: container.to_owned(),
            widget: Some(widget),
            live_sessions: self.live_sessions.clone(),
        })
    }

    pub fn destroy_session(
        &self,
        session: &mut MapSession<F::Widget>,
    ) -> Result<(), SessionClosedError> {
        session.close()?;
        log::info!("destroyed map session {} on '{}'", session.id, session.container);
        Ok(())
    }

    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }
}
