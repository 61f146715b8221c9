/// Valor que desactiva todos los filtros.
pub const FILTER_OFF: &str = "off";

/// Presets de filtro disponibles en `/filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPreset {
    Off,
    BassBoost,
    Nightcore,
    SlowedReverb,
    EightD,
}

impl FilterPreset {
    pub const ALL: [FilterPreset; 5] = [
        FilterPreset::Off,
        FilterPreset::BassBoost,
        FilterPreset::Nightcore,
        FilterPreset::SlowedReverb,
        FilterPreset::EightD,
    ];

    /// Expresión de filtergraph de ffmpeg (o `off`).
    pub fn expression(&self) -> &'static str {
        match self {
            FilterPreset::Off => FILTER_OFF,
            FilterPreset::BassBoost => "bass=g=5:f=100:w=0.6",
            FilterPreset::Nightcore => "asetrate=48000*1.25,aresample=48000",
            FilterPreset::SlowedReverb => "asetrate=48000*0.8,aresample=48000,aecho=0.8:0.5:1000:0.2",
            FilterPreset::EightD => "apulsator=hz=0.125",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FilterPreset::Off => "Desactivar todos",
            FilterPreset::BassBoost => "Bassboost (suave)",
            FilterPreset::Nightcore => "Nightcore",
            FilterPreset::SlowedReverb => "Slowed + Reverb",
            FilterPreset::EightD => "8D",
        }
    }
}

/// Cadena ordenada de filtros; vacía = sin efecto.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain(Vec<String>);

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reemplaza la cadena por `[spec]`, o la vacía si `spec == "off"`.
    pub fn apply(&mut self, spec: &str) {
        let spec = spec.trim();
        if spec.is_empty() || spec == FILTER_OFF {
            self.0.clear();
        } else {
            self.0 = vec![spec.to_string()];
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Expresión `-af` para ffmpeg, `None` si no hay filtros.
    pub fn to_expression(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join(","))
        }
    }
}
