//! Playback control and the elapsed-time clamp

/// Keyframe rate of animation clips
pub const ANIMATION_FPS: f32 = 30.0;

/// Largest elapsed time fed to physics in one update, in seconds
pub const MAX_ELAPSED: f32 = 1.0 / ANIMATION_FPS;

/// Playback mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayMode {
    #[default]
    Play,
    Stop,
    /// Run exactly one update at the current time, then stop
    Update,
    /// Advance one animation frame, then stop
    StepForward,
    /// Go back one animation frame, then stop
    StepBackward,
}

/// Time values for one model update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    /// Animation clip time in seconds
    pub anim_time: f32,
    /// Physics step in seconds, never above [`MAX_ELAPSED`] when clipping is on
    pub elapsed: f32,
}

/// Accumulates animation time and owns the elapsed-time clamp.
///
/// Everything that feeds elapsed time into a mesh update goes through
/// [`tick`](Self::tick), so the clamp is applied in one place.
#[derive(Debug, Clone)]
pub struct PlayController {
    mode: PlayMode,
    anim_time: f32,
    /// Clamp elapsed time to [`MAX_ELAPSED`] (default: on)
    pub clip_elapsed: bool,
}

impl Default for PlayController {
    fn default() -> Self {
        Self {
            mode: PlayMode::Play,
            anim_time: 0.0,
            clip_elapsed: true,
        }
    }
}

impl PlayController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        log::debug!("Play mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
    }

    pub fn anim_time(&self) -> f32 {
        self.anim_time
    }

    /// Jump to `time` seconds, e.g. before a reset
    pub fn seek(&mut self, time: f32) {
        self.anim_time = time.max(0.0);
    }

    /// Clamp `elapsed` the way every update expects it
    pub fn clip(&self, elapsed: f32) -> f32 {
        let elapsed = elapsed.max(0.0);
        if self.clip_elapsed {
            elapsed.min(MAX_ELAPSED)
        } else {
            elapsed
        }
    }

    /// Advance by the wall-clock `elapsed` seconds.
    ///
    /// Returns the update to run this frame, or `None` while stopped.
    /// One-shot modes fall back to [`PlayMode::Stop`] afterwards.
    pub fn tick(&mut self, elapsed: f32) -> Option<FrameTick> {
        let step = 1.0 / ANIMATION_FPS;
        let tick = match self.mode {
            PlayMode::Stop => return None,
            PlayMode::Play => {
                let elapsed = self.clip(elapsed);
                self.anim_time += elapsed;
                FrameTick {
                    anim_time: self.anim_time,
                    elapsed,
                }
            }
            PlayMode::Update => FrameTick {
                anim_time: self.anim_time,
                elapsed: 0.0,
            },
            PlayMode::StepForward => {
                self.anim_time += step;
                FrameTick {
                    anim_time: self.anim_time,
                    elapsed: self.clip(step),
                }
            }
            PlayMode::StepBackward => {
                self.anim_time = (self.anim_time - step).max(0.0);
                FrameTick {
                    anim_time: self.anim_time,
                    elapsed: 0.0,
                }
            }
        };

        if self.mode != PlayMode::Play {
            self.mode = PlayMode::Stop;
        }
        Some(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_clamps_elapsed() {
        let mut controller = PlayController::new();
        let tick = controller.tick(0.5).unwrap();
        assert_eq!(tick.elapsed, MAX_ELAPSED);
        assert_eq!(tick.anim_time, MAX_ELAPSED);

        let tick = controller.tick(0.01).unwrap();
        assert!((tick.elapsed - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_clipping_can_be_disabled() {
        let mut controller = PlayController::new();
        controller.clip_elapsed = false;
        assert_eq!(controller.tick(0.5).unwrap().elapsed, 0.5);
    }

    #[test]
    fn test_stop_produces_no_update() {
        let mut controller = PlayController::new();
        controller.set_mode(PlayMode::Stop);
        assert!(controller.tick(0.016).is_none());
    }

    #[test]
    fn test_one_shot_modes_return_to_stop() {
        let mut controller = PlayController::new();
        controller.seek(1.0);

        controller.set_mode(PlayMode::StepForward);
        let tick = controller.tick(0.0).unwrap();
        assert!((tick.anim_time - (1.0 + 1.0 / 30.0)).abs() < 1e-6);
        assert_eq!(controller.mode(), PlayMode::Stop);

        controller.set_mode(PlayMode::StepBackward);
        controller.tick(0.0);
        controller.set_mode(PlayMode::StepBackward);
        let tick = controller.tick(0.0).unwrap();
        assert!((tick.anim_time - (1.0 - 1.0 / 30.0)).abs() < 1e-5);
        assert_eq!(tick.elapsed, 0.0);

        controller.set_mode(PlayMode::Update);
        let tick = controller.tick(10.0).unwrap();
        assert_eq!(tick.elapsed, 0.0);
        assert!(controller.tick(0.0).is_none());
    }

    #[test]
    fn test_step_backward_stops_at_zero() {
        let mut controller = PlayController::new();
        controller.set_mode(PlayMode::StepBackward);
        assert_eq!(controller.tick(0.0).unwrap().anim_time, 0.0);
    }
}
