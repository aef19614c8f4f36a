//! Page navigation state for manga mode.

use log::{debug, warn};

/// Progress a page turn starts at.
const TRANSITION_START: f32 = 0.01;

/// Direction of a page turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

impl Direction {
    /// Signed page delta of a turn in this direction.
    pub fn sign(self) -> i64 {
        match self {
            Direction::Next => 1,
            Direction::Previous => -1,
        }
    }
}

/// Whether a page turn is animating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Idle,
    /// `progress` lies in `(0, 1)` and only grows.
    Turning { direction: Direction, progress: f32 },
}

/// Current page plus the in-flight page-turn animation.
///
/// The page index changes only when a turn's progress reaches 1.0; no turn or
/// jump can start while another turn is animating.
#[derive(Debug, Clone)]
pub struct PageNavigator {
    current: usize,
    page_count: usize,
    transition: Transition,
    speed: f32,
}

impl PageNavigator {
    /// Creates a navigator on the first page; `speed` is the progress added per frame.
    pub fn new(page_count: usize, speed: f32) -> Self {
        Self {
            current: 0,
            page_count,
            transition: Transition::Idle,
            speed,
        }
    }

    /// Starts a page turn in the specified direction.
    fn turn(&mut self, direction: Direction) -> bool {
        if !self.is_idle() {
            debug!("Page turn ignored: transition in progress");
            return false;
        }

        let possible = match direction {
            Direction::Next => self.current + 1 < self.page_count,
            Direction::Previous => self.current > 0,
        };
        if !possible {
            warn!("No {:?} page available", direction);
            return false;
        }

        self.transition = Transition::Turning {
            direction,
            progress: TRANSITION_START,
        };
        true
    }

    /// Starts turning to the next page. Returns whether a turn started.
    pub fn next_page(&mut self) -> bool {
        self.turn(Direction::Next)
    }

    /// Starts turning to the previous page. Returns whether a turn started.
    pub fn prev_page(&mut self) -> bool {
        self.turn(Direction::Previous)
    }

    /// Jumps to `page` (0-indexed, clamped). Refused while a turn is animating.
    pub fn go_to_page(&mut self, page: usize) -> bool {
        if !self.is_idle() {
            debug!("Page jump to {} ignored: transition in progress", page);
            return false;
        }
        self.current = page.min(self.page_count.saturating_sub(1));
        true
    }

    /// Advances the running turn by one frame.
    ///
    /// Returns `true` on the frame the turn completes and the page changes.
    pub fn update_transition(&mut self) -> bool {
        let Transition::Turning {
            direction,
            progress,
        } = self.transition
        else {
            return false;
        };

        let progress = progress + self.speed;
        if progress < 1.0 {
            self.transition = Transition::Turning {
                direction,
                progress,
            };
            return false;
        }

        self.current = match direction {
            Direction::Next => self.current + 1,
            Direction::Previous => self.current - 1,
        };
        self.transition = Transition::Idle;
        true
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn is_idle(&self) -> bool {
        self.transition == Transition::Idle
    }

    /// Page being turned to, if a turn is animating.
    pub fn target_page(&self) -> Option<usize> {
        match self.transition {
            Transition::Idle => None,
            Transition::Turning { direction, .. } => match direction {
                Direction::Next => Some(self.current + 1),
                Direction::Previous => Some(self.current - 1),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_completion(nav: &mut PageNavigator) -> usize {
        let mut frames = 0;
        while !nav.update_transition() {
            frames += 1;
            assert!(frames < 1000, "transition never finished");
        }
        frames + 1
    }

    #[test]
    fn turn_commits_only_when_progress_reaches_one() {
        let mut nav = PageNavigator::new(5, 0.05);
        assert!(nav.next_page());
        assert_eq!(nav.target_page(), Some(1));

        let mut last_progress = 0.0;
        loop {
            match nav.transition() {
                Transition::Turning { progress, .. } => {
                    assert!(progress > last_progress && progress < 1.0);
                    assert_eq!(nav.current_page(), 0);
                    last_progress = progress;
                }
                Transition::Idle => break,
            }
            nav.update_transition();
        }
        assert_eq!(nav.current_page(), 1);
    }

    #[test]
    fn repeated_requests_during_a_turn_move_one_page() {
        let mut nav = PageNavigator::new(5, 0.1);
        assert!(nav.next_page());
        for _ in 0..20 {
            assert!(!nav.next_page());
            assert!(!nav.prev_page());
            if nav.update_transition() {
                break;
            }
        }
        assert_eq!(nav.current_page(), 1);
        assert!(nav.is_idle());
    }

    #[test]
    fn boundaries_are_no_ops() {
        let mut nav = PageNavigator::new(2, 0.5);
        assert!(!nav.prev_page());
        assert!(nav.next_page());
        run_to_completion(&mut nav);
        assert_eq!(nav.current_page(), 1);
        assert!(!nav.next_page());
        assert!(nav.is_idle());
    }

    #[test]
    fn previous_turn_moves_back() {
        let mut nav = PageNavigator::new(4, 0.25);
        nav.go_to_page(2);
        assert!(nav.prev_page());
        assert_eq!(nav.target_page(), Some(1));
        assert_eq!(run_to_completion(&mut nav), 4);
        assert_eq!(nav.current_page(), 1);
    }

    #[test]
    fn jumps_clamp_and_wait_for_idle() {
        let mut nav = PageNavigator::new(10, 0.05);
        assert!(nav.go_to_page(42));
        assert_eq!(nav.current_page(), 9);

        nav.go_to_page(3);
        nav.next_page();
        assert!(!nav.go_to_page(0));
        assert_eq!(nav.current_page(), 3);
    }

    #[test]
    fn empty_sequence_stays_put() {
        let mut nav = PageNavigator::new(0, 0.05);
        assert!(!nav.next_page());
        assert!(nav.go_to_page(5));
        assert_eq!(nav.current_page(), 0);
    }
}
