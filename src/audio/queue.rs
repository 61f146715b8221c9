use std::collections::VecDeque;
use tracing::{debug, info};

use super::{error::PlayerError, track::Track};

/// Cola FIFO de un guild. Nunca contiene el track que está sonando.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final; devuelve su posición (0 = siguiente).
    pub fn push(&mut self, track: Track) -> Result<usize, PlayerError> {
        if self.items.len() >= self.max_size {
            return Err(PlayerError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        Ok(self.items.len() - 1)
    }

    /// Saca el siguiente track (FIFO estricto)
    pub fn pop_next(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        match &next {
            Some(track) => info!("➡️ Siguiente en cola (FIFO): {}", track.title()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    /// Limpia la cola y devuelve cuántos tracks se quitaron.
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        if cleared > 0 {
            info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        }
        cleared
    }

    /// Elimina un track específico
    pub fn remove(&mut self, index: usize) -> Result<Track, PlayerError> {
        let removed = self
            .items
            .remove(index)
            .ok_or(PlayerError::InvalidIndex(index))?;
        debug!("❌ Track eliminado en posición {}", index);
        Ok(removed)
    }

    /// Mueve un track a una nueva posición
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<(), PlayerError> {
        if from >= self.items.len() {
            return Err(PlayerError::InvalidIndex(from));
        }
        if to >= self.items.len() {
            return Err(PlayerError::InvalidIndex(to));
        }

        if from != to {
            if let Some(item) = self.items.remove(from) {
                self.items.insert(to, item);
                debug!("📍 Track movido de posición {} a {}", from, to);
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }
}

/// Página de la cola para la vista de estado.
#[derive(Debug, Clone)]
pub struct QueuePage<'a> {
    pub items: &'a [Track],
    /// Índice absoluto del primer item de la página.
    pub first_index: usize,
    pub current_page: usize,
    pub total_pages: usize,
}

/// Obtiene una página específica de una lista de tracks (páginas desde 1).
pub fn page_of(tracks: &[Track], page: usize, items_per_page: usize) -> QueuePage<'_> {
    let items_per_page = items_per_page.max(1);
    let total_pages = tracks.len().div_ceil(items_per_page).max(1);
    let current_page = page.clamp(1, total_pages);
    let start = (current_page - 1) * items_per_page;
    let end = (start + items_per_page).min(tracks.len());

    QueuePage {
        items: &tracks[start.min(end)..end],
        first_index: start,
        current_page,
        total_pages,
    }
}
