//! Viewer window
//!
//! Polls the shared texture slot once per frame and shows the latest grid
//! image scaled to fit, with nearest-neighbour filtering so cells stay sharp.
//! Closing the window requests shutdown, and a shutdown requested elsewhere
//! closes the window.

use std::time::Duration;

use cellsynth_core::{SharedExchange, ShutdownSignal};
use eframe::egui;
use thiserror::Error;
use tracing::{debug, info};

/// Repaint interval while idle; new frames arrive at the tick rate anyway.
const REPAINT_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Error)]
pub enum GuiError {
    #[error("event loop failed: {0}")]
    EventLoop(String),
}

/// What the status bar shows besides the image.
#[derive(Debug, Clone)]
pub struct ViewerInfo {
    pub backend: String,
    pub chunk_seconds: f64,
}

pub struct ViewerApp {
    exchange: SharedExchange,
    shutdown: ShutdownSignal,
    info: ViewerInfo,
    dimensions: (usize, usize),
    texture: Option<egui::TextureHandle>,
    pixels: Vec<u8>,
    /// Texture generation last uploaded; one per completed tick.
    generation: u64,
}

impl ViewerApp {
    pub fn new(exchange: SharedExchange, shutdown: ShutdownSignal, info: ViewerInfo) -> Self {
        Self {
            dimensions: exchange.texture_dimensions(),
            exchange,
            shutdown,
            info,
            texture: None,
            pixels: Vec::new(),
            generation: 0,
        }
    }

    /// Upload the slot's contents if a newer frame was published.
    fn refresh_texture(&mut self, ctx: &egui::Context) {
        let Some(generation) = self.exchange.read_texture(&mut self.pixels, self.generation) else {
            return;
        };
        self.generation = generation;

        let (width, height) = self.dimensions;
        let image = egui::ColorImage::from_rgba_unmultiplied([width, height], &self.pixels);
        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::NEAREST),
            None => {
                self.texture =
                    Some(ctx.load_texture("cellsynth-grid", image, egui::TextureOptions::NEAREST));
            }
        }
    }

    fn simulation_time(&self) -> f64 {
        self.generation as f64 * self.info.chunk_seconds
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.shutdown.is_requested() {
            debug!("Shutdown requested, closing viewer");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        if ctx.input(|i| i.viewport().close_requested() || i.key_pressed(egui::Key::Escape)) {
            if self.shutdown.request() {
                info!("Viewer closed, shutting down");
            }
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        if ctx.input(|i| i.key_pressed(egui::Key::F11)) {
            let is_fullscreen = ctx.input(|i| i.viewport().fullscreen).unwrap_or(false);
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(!is_fullscreen));
        }

        self.refresh_texture(ctx);

        let (queued, buffered) = self.exchange.queue_depth();
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(format!("t = {:.2}s", self.simulation_time()));
                ui.separator();
                ui.label(format!("ticks: {}", self.generation));
                ui.separator();
                ui.label(format!("queue: {queued} ({:.0} ms)", buffered * 1000.0));
                ui.separator();
                ui.label(&self.info.backend);
            });
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let Some(texture) = &self.texture else {
                    ui.centered_and_justified(|ui| ui.label("Waiting for first frame..."));
                    return;
                };
                let available = ui.available_size();
                let [w, h] = texture.size_vec2().into();
                let scale = (available.x / w).min(available.y / h).max(0.0);
                ui.centered_and_justified(|ui| {
                    ui.image((texture.id(), egui::vec2(w * scale, h * scale)));
                });
            });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}

/// Run the viewer on the calling thread until the window closes.
pub fn run(
    exchange: SharedExchange,
    shutdown: ShutdownSignal,
    info: ViewerInfo,
) -> Result<(), GuiError> {
    let (width, height) = exchange.texture_dimensions();
    let side = (width.max(height) as f32).clamp(256.0, 768.0);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("cellsynth")
            .with_inner_size([side, side + 24.0]),
        ..Default::default()
    };

    let app_shutdown = shutdown.clone();
    let result = eframe::run_native(
        "cellsynth",
        native_options,
        Box::new(move |_cc| Ok(Box::new(ViewerApp::new(exchange, app_shutdown, info)))),
    )
    .map_err(|e| GuiError::EventLoop(format!("eframe error: {e}")));

    // The event loop can also end without a close request (e.g. platform quit)
    shutdown.request();
    result
}
