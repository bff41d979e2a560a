//! Console command set for the reader front end.

use std::str::FromStr;

use crate::error::SensorError;

/// One console command. The set is closed and handled exhaustively by
/// the front end; unknown input is a parse error, never a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Read every group once.
    ReadAll,
    /// Read the temperature group once.
    ReadTemperature,
    /// Read the barometer group once.
    ReadBarometer,
    /// Read the accelerometer group once.
    ReadAccelerometer,
    /// Change the periodic report frequency in Hz.
    SetFrequency(u32),
    /// Print the discovery summary.
    ShowConfig,
    /// Shut down.
    Quit,
}

impl FromStr for Command {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "r" => Ok(Command::ReadAll),
            "t" => Ok(Command::ReadTemperature),
            "b" => Ok(Command::ReadBarometer),
            "a" => Ok(Command::ReadAccelerometer),
            "c" => Ok(Command::ShowConfig),
            "q" => Ok(Command::Quit),
            // A bare integer retunes the report frequency, as the
            // original console did.
            other => other
                .parse::<u32>()
                .ok()
                .filter(|hz| *hz > 0)
                .map(Command::SetFrequency)
                .ok_or_else(|| {
                    SensorError::InvalidParameter(format!("unknown command {other:?}"))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_letters() {
        assert_eq!("r".parse::<Command>().unwrap(), Command::ReadAll);
        assert_eq!("t".parse::<Command>().unwrap(), Command::ReadTemperature);
        assert_eq!("b".parse::<Command>().unwrap(), Command::ReadBarometer);
        assert_eq!("a".parse::<Command>().unwrap(), Command::ReadAccelerometer);
        assert_eq!("c".parse::<Command>().unwrap(), Command::ShowConfig);
        assert_eq!("q".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_frequency() {
        assert_eq!("5".parse::<Command>().unwrap(), Command::SetFrequency(5));
        assert_eq!(
            " 30 \n".parse::<Command>().unwrap(),
            Command::SetFrequency(30)
        );
    }

    #[test]
    fn test_rejects_unknown_input() {
        assert!("x".parse::<Command>().is_err());
        assert!("0".parse::<Command>().is_err());
        assert!("-3".parse::<Command>().is_err());
        assert!("read".parse::<Command>().is_err());
    }
}
