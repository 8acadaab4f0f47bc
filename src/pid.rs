use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct PidParameter {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    // A negative value disables the limit.
    pub saturation: f32,
    pub max_integral: f32,
}

impl Default for PidParameter {
    fn default() -> Self {
        PidParameter {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            saturation: -1.0,
            max_integral: -1.0,
        }
    }
}

/// Individual terms of the last response, for tuning logs.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PidTerms {
    pub proportional: f32,
    pub integral: f32,
    pub derivative: f32,
    pub response: f32,
}

/// `response = kp * (error + ki * integral - kd * rate)` where `rate` is the
/// rate of change of the measured value.
pub struct Pid {
    param: PidParameter,
    integral: f32,
    last_error: Option<f32>,
    last_response: f32,
}

impl Pid {
    pub fn new(param: &PidParameter) -> Self {
        Pid {
            param: *param,
            integral: 0.0,
            last_error: None,
            last_response: 0.0,
        }
    }

    /// Derives the rate from consecutive errors, assuming a constant reference.
    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        let rate = match self.last_error {
            Some(last) if dt > 0.0 => -(error - last) / dt,
            _ => 0.0,
        };
        self.update_with(error, rate, dt, None)
    }

    pub fn update_with_rate(&mut self, error: f32, rate: f32, dt: f32) -> f32 {
        self.update_with(error, rate, dt, None)
    }

    pub fn update_with(
        &mut self,
        error: f32,
        rate: f32,
        dt: f32,
        diagnostics: Option<&mut PidTerms>,
    ) -> f32 {
        let p = &self.param;

        // Conditional integration: hold the integral while saturated unless
        // it is winding back towards zero.
        let saturated = p.saturation >= 0.0 && self.last_response.abs() >= p.saturation;
        let unwinding = self.integral * error < 0.0;
        if !saturated || unwinding {
            self.integral += error * dt;
        }

        if p.max_integral >= 0.0 {
            let gain = p.kp * p.ki;
            if gain != 0.0 {
                let limit = (p.max_integral / gain).abs();
                self.integral = self.integral.max(-limit).min(limit);
            }
        }

        let proportional = p.kp * error;
        let integral = p.kp * p.ki * self.integral;
        let derivative = -p.kp * p.kd * rate;
        let mut response = proportional + integral + derivative;
        if p.saturation >= 0.0 {
            response = response.max(-p.saturation).min(p.saturation);
        }

        self.last_error = Some(error);
        self.last_response = response;

        if let Some(terms) = diagnostics {
            *terms = PidTerms {
                proportional,
                integral,
                derivative,
                response,
            };
        }
        response
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
        self.last_response = 0.0;
    }
}
